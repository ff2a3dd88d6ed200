//! Offline policy verification tool.
//!
//! Loads a tabular container-policy ruleset, prints it, and optionally
//! evaluates a JSON request body against it. Exits non-zero on violation so
//! it can gate CI checks on policy fixtures.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use authz_gate::compliance::{check_body, Compliance};
use authz_gate::policy::load_rules;

#[derive(Parser, Debug)]
#[command(
    name = "policy_check",
    about = "Validate a container policy ruleset and optionally check a request body against it"
)]
struct Args {
    /// Path to the tabular policy document.
    #[arg(long, env = "AUTHZ_GATE_POLICY_PATH")]
    policy: PathBuf,

    /// JSON request-body file to evaluate against the ruleset.
    #[arg(long)]
    body: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let rules = load_rules(&args.policy)?;
    println!("loaded {} rules from {}", rules.len(), args.policy.display());
    for rule in &rules {
        let mode = if rule.kind.must_not_contain() {
            "must not contain"
        } else {
            "must equal"
        };
        println!("  {} ({:?}) {} '{}'", rule.field, rule.kind, mode, rule.expected);
    }

    let Some(body_path) = args.body else {
        return Ok(ExitCode::SUCCESS);
    };
    let body = std::fs::read_to_string(&body_path)
        .with_context(|| format!("failed to read body file {}", body_path.display()))?;

    match check_body(&rules, &body) {
        Compliance::Comply => {
            println!("body complies with the ruleset");
            Ok(ExitCode::SUCCESS)
        }
        Compliance::Violation { field } => {
            eprintln!("violation: {field}");
            Ok(ExitCode::FAILURE)
        }
    }
}
