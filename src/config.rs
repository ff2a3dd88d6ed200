//! Gate configuration: JSON file plus environment overrides.
//!
//! The admin secret is sourced from the environment only and compared
//! byte-for-byte against the credential header; it never appears in the
//! config file.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_POLICY_PATH: &str = "container_policy.csv";
const DEFAULT_CREDENTIAL_HEADER: &str = "Authheader";
const DEFAULT_MANUAL_URL: &str = "https://wiki.local/authz-gate/manual";

const CONFIG_ENV: &str = "AUTHZ_GATE_CONFIG";
const ADMIN_SECRET_ENV: &str = "AUTHZ_GATE_ADMIN_SECRET";
const POLICY_PATH_ENV: &str = "AUTHZ_GATE_POLICY_PATH";
const MANUAL_URL_ENV: &str = "AUTHZ_GATE_MANUAL_URL";

fn default_allow_paths() -> Vec<String> {
    [
        "/_ping",
        "/images/json",
        "/containers/json?all=1",
        "/containers/json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_deny_prefixes() -> Vec<String> {
    ["/commit", "/volumes/create", "/volumes", "/plugins"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Default)]
struct GateConfigFile {
    policy_path: Option<String>,
    credential_header: Option<String>,
    manual_url: Option<String>,
    allow_paths: Option<Vec<String>>,
    deny_prefixes: Option<Vec<String>>,
    allow_unresolved_refs: Option<bool>,
}

/// Runtime configuration for the decision engine.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Tabular policy document for creation/update compliance checks.
    pub policy_path: PathBuf,
    /// Header carrying the caller credential.
    pub credential_header: String,
    /// Operator manual URL included in instructional denial messages.
    pub manual_url: String,
    /// Paths allowed on exact match (query string included).
    pub allow_paths: Vec<String>,
    /// Path prefixes denied before any other routing.
    pub deny_prefixes: Vec<String>,
    /// Whether unrecognized container references (and unclaimed exec
    /// targets) are allowed rather than denied.
    pub allow_unresolved_refs: bool,
    /// Trusted bypass secret, environment-sourced.
    pub admin_secret: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from(DEFAULT_POLICY_PATH),
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            manual_url: DEFAULT_MANUAL_URL.to_string(),
            allow_paths: default_allow_paths(),
            deny_prefixes: default_deny_prefixes(),
            allow_unresolved_refs: true,
            admin_secret: None,
        }
    }
}

impl GateConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GateConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            policy_path: file
                .policy_path
                .map(PathBuf::from)
                .unwrap_or(defaults.policy_path),
            credential_header: file
                .credential_header
                .unwrap_or(defaults.credential_header),
            manual_url: file.manual_url.unwrap_or(defaults.manual_url),
            allow_paths: file.allow_paths.unwrap_or(defaults.allow_paths),
            deny_prefixes: file.deny_prefixes.unwrap_or(defaults.deny_prefixes),
            allow_unresolved_refs: file
                .allow_unresolved_refs
                .unwrap_or(defaults.allow_unresolved_refs),
            admin_secret: None,
        }
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(POLICY_PATH_ENV) {
            if !path.trim().is_empty() {
                self.policy_path = PathBuf::from(path);
            }
        }
        if let Ok(url) = std::env::var(MANUAL_URL_ENV) {
            if !url.trim().is_empty() {
                self.manual_url = url;
            }
        }
        if let Ok(secret) = std::env::var(ADMIN_SECRET_ENV) {
            if !secret.is_empty() {
                self.admin_secret = Some(secret);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let header = self.credential_header.trim();
        if header.is_empty() {
            return Err(anyhow!("credential_header must not be empty"));
        }
        if header.chars().any(char::is_whitespace) {
            return Err(anyhow!(
                "credential_header '{}' must not contain whitespace",
                self.credential_header
            ));
        }
        for path in &self.allow_paths {
            if !path.starts_with('/') {
                return Err(anyhow!("allow_paths entry '{}' must start with '/'", path));
            }
        }
        for prefix in &self.deny_prefixes {
            if !prefix.starts_with('/') {
                return Err(anyhow!(
                    "deny_prefixes entry '{}' must start with '/'",
                    prefix
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_static_route_tables() {
        let cfg = GateConfig::default();
        assert!(cfg.allow_paths.contains(&"/_ping".to_string()));
        assert!(cfg.allow_paths.contains(&"/containers/json?all=1".to_string()));
        assert!(cfg.deny_prefixes.contains(&"/volumes".to_string()));
        assert!(cfg.allow_unresolved_refs);
        assert!(cfg.admin_secret.is_none());
    }

    #[test]
    fn validate_rejects_bad_header_names() {
        let mut cfg = GateConfig::default();
        cfg.credential_header = String::new();
        assert!(cfg.validate().is_err());
        cfg.credential_header = "Auth header".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_route_entries() {
        let mut cfg = GateConfig::default();
        cfg.deny_prefixes.push("volumes".to_string());
        assert!(cfg.validate().is_err());
    }
}
