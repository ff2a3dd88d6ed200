//! Policy ruleset model and tabular loader.
//!
//! The policy document is a delimited file with columns
//! `[field, expected, kind]`, one rule per row, consumed in file order.

use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Field-extraction kind for a compliance rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleKind {
    /// Comma-quoted list value; exact-match semantics.
    Slice,
    /// Single quoted value; exact-match semantics.
    Str,
    /// Unquoted literal value; exact-match semantics.
    Bool,
    /// Comma-quoted list value; the expected value must NOT appear.
    Cmd,
}

impl RuleKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "slice" => Ok(Self::Slice),
            "string" => Ok(Self::Str),
            "bool" => Ok(Self::Bool),
            "cmd" => Ok(Self::Cmd),
            other => Err(anyhow!(
                "unsupported rule kind '{}'; expected 'slice', 'string', 'bool', or 'cmd'",
                other
            )),
        }
    }

    /// `cmd` rules forbid the expected value instead of requiring it.
    pub fn must_not_contain(self) -> bool {
        matches!(self, Self::Cmd)
    }
}

/// One declarative constraint on a container-creation/update body field.
#[derive(Clone, Debug)]
pub struct PolicyRule {
    pub field: String,
    pub expected: String,
    pub kind: RuleKind,
}

/// Load the ruleset from a delimited tabular file, preserving file order.
pub fn load_rules(path: &Path) -> Result<Vec<PolicyRule>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open policy file {}", path.display()))?;

    let mut rules = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("failed to read policy file {}", path.display()))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        if record.len() < 3 {
            return Err(anyhow!(
                "policy row {} has {} columns; expected [field, expected, kind]",
                row + 1,
                record.len()
            ));
        }
        rules.push(PolicyRule {
            field: record[0].to_string(),
            expected: record[1].to_string(),
            kind: RuleKind::parse(&record[2])
                .with_context(|| format!("policy row {}", row + 1))?,
        });
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_rule_kinds() {
        assert_eq!(RuleKind::parse("slice").unwrap(), RuleKind::Slice);
        assert_eq!(RuleKind::parse("string").unwrap(), RuleKind::Str);
        assert_eq!(RuleKind::parse(" Bool ").unwrap(), RuleKind::Bool);
        assert_eq!(RuleKind::parse("cmd").unwrap(), RuleKind::Cmd);
        assert!(RuleKind::parse("regex").is_err());
    }

    #[test]
    fn only_cmd_forbids() {
        assert!(RuleKind::Cmd.must_not_contain());
        assert!(!RuleKind::Slice.must_not_contain());
        assert!(!RuleKind::Str.must_not_contain());
        assert!(!RuleKind::Bool.must_not_contain());
    }

    #[test]
    fn loads_rules_in_file_order() {
        let mut file = NamedTempFile::new().expect("temp policy");
        writeln!(file, "Privileged,false,bool").unwrap();
        writeln!(file, "Binds,/var/run/docker.sock,cmd").unwrap();
        writeln!(file, "NetworkMode,bridge,string").unwrap();

        let rules = load_rules(file.path()).expect("load rules");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].field, "Privileged");
        assert_eq!(rules[0].kind, RuleKind::Bool);
        assert_eq!(rules[1].field, "Binds");
        assert_eq!(rules[1].expected, "/var/run/docker.sock");
        assert_eq!(rules[2].kind, RuleKind::Str);
    }

    #[test]
    fn rejects_short_rows() {
        let mut file = NamedTempFile::new().expect("temp policy");
        writeln!(file, "Privileged,false").unwrap();
        let err = load_rules(file.path()).unwrap_err();
        assert!(err.to_string().contains("expected [field, expected, kind]"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_rules(Path::new("/nonexistent/policy.csv")).is_err());
    }
}
