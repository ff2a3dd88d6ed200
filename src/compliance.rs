//! Declarative compliance checks for container-creation/update bodies.
//!
//! The body is parsed into a JSON tree and each rule's field is located by
//! depth-first key search, so nested fields like `HostConfig.Privileged`
//! match wherever they appear. Rules whose field is absent (or whose value
//! has the wrong shape for the rule kind) are vacuously satisfied.
//! Evaluation stops at the first failing rule.

use std::path::Path;

use serde_json::Value;

use crate::policy::{load_rules, PolicyRule, RuleKind};

/// Outcome of a compliance check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compliance {
    Comply,
    /// The first failing rule's field name, or a diagnostic string when the
    /// check could not be performed at all (fail-closed).
    Violation { field: String },
}

impl Compliance {
    pub fn is_comply(&self) -> bool {
        matches!(self, Compliance::Comply)
    }
}

/// Check a raw body against the ruleset at `path`.
///
/// An unreadable or unparseable ruleset fails closed: an unverifiable
/// creation request must not be approved.
pub fn check_policy_file(path: &Path, body: &str) -> Compliance {
    match load_rules(path) {
        Ok(rules) => check_body(&rules, body),
        Err(e) => Compliance::Violation {
            field: format!("policy ruleset unavailable: {e:#}"),
        },
    }
}

/// Check a raw body against an already-loaded ruleset, in rule order.
pub fn check_body(rules: &[PolicyRule], body: &str) -> Compliance {
    let root: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            return Compliance::Violation {
                field: format!("request body is not valid JSON: {e}"),
            }
        }
    };

    for rule in rules {
        let Some(value) = find_field(&root, &rule.field) else {
            continue;
        };
        let Some(extracted) = extract(value, rule.kind) else {
            continue;
        };
        let failed = if rule.kind.must_not_contain() {
            // Quote-wrap before the substring test so expected values that
            // anchor on quotes keep working.
            format!("\"{extracted}\"").contains(&rule.expected)
        } else {
            extracted != rule.expected
        };
        if failed {
            return Compliance::Violation {
                field: rule.field.clone(),
            };
        }
    }
    Compliance::Comply
}

/// Depth-first search for the first object key equal to `field`.
fn find_field<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(v) = map.get(field) {
                return Some(v);
            }
            map.values().find_map(|v| find_field(v, field))
        }
        Value::Array(items) => items.iter().find_map(|v| find_field(v, field)),
        _ => None,
    }
}

/// Render a field value in the shape the rule kind expects.
///
/// List kinds join string elements with `","` so the comparison form matches
/// the quoted-list wire representation; literal kinds render unquoted
/// scalars. A shape mismatch yields `None` (rule vacuously satisfied).
fn extract(value: &Value, kind: RuleKind) -> Option<String> {
    match kind {
        RuleKind::Slice | RuleKind::Cmd => {
            let items = value.as_array()?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(item.as_str()?);
            }
            if parts.is_empty() {
                return None;
            }
            Some(parts.join("\",\""))
        }
        RuleKind::Str => value.as_str().map(str::to_string),
        RuleKind::Bool => match value {
            Value::Bool(_) | Value::Number(_) | Value::Null => Some(value.to_string()),
            _ => None,
        },
    }
}
