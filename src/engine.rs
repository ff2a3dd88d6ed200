//! Top-level decision engine.
//!
//! A state-machine-free request classifier: pure function of the incoming
//! request plus the shared identity registry. Each call short-circuits on
//! the static rules or delegates to the compliance checker and the
//! ownership branches before returning a verdict.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};
use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

use crate::compliance::{self, Compliance};
use crate::config::GateConfig;
use crate::daemon::ContainerLister;
use crate::eval::AccessEvaluator;
use crate::fingerprint;
use crate::registry::{ClaimOutcome, IdentityRegistry};

/// Container-creation endpoint; routed to compliance, never to ownership.
pub const CONTAINER_CREATE_PATH: &str = "/containers/create";
/// Namespace of container-targeted actions.
pub const CONTAINER_PREFIX: &str = "/containers/";
/// Namespace of exec-instance-targeted actions.
pub const EXEC_PREFIX: &str = "/exec/";

const DENIED: &str = "access denied by authz gate";

/// One intercepted daemon API call, request phase.
#[derive(Clone, Debug, Default)]
pub struct AuthzRequest {
    pub method: String,
    /// Raw request URI, API-version segment and percent-encoding included.
    pub uri: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// The gate's answer: allow flag plus a caller-facing denial reason.
/// No denial is ever silent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthzVerdict {
    pub allow: bool,
    pub msg: Option<String>,
}

impl AuthzVerdict {
    pub fn allow() -> Self {
        Self {
            allow: true,
            msg: None,
        }
    }

    pub fn deny(msg: impl Into<String>) -> Self {
        Self {
            allow: false,
            msg: Some(msg.into()),
        }
    }
}

/// Orchestrates one authorization decision per intercepted request.
pub struct DecisionEngine {
    cfg: GateConfig,
    registry: Arc<IdentityRegistry>,
    lister: Arc<dyn ContainerLister>,
    evaluator: Option<Box<dyn AccessEvaluator>>,
}

impl DecisionEngine {
    pub fn new(cfg: GateConfig, lister: Arc<dyn ContainerLister>) -> Self {
        Self {
            cfg,
            registry: Arc::new(IdentityRegistry::new()),
            lister,
            evaluator: None,
        }
    }

    /// Wire in an external policy evaluator as an additional gate.
    pub fn with_evaluator(mut self, evaluator: Box<dyn AccessEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Shared registry handle, mainly for diagnostics and tests.
    pub fn registry(&self) -> Arc<IdentityRegistry> {
        self.registry.clone()
    }

    /// Authorize the request phase of an intercepted daemon API call.
    pub fn authorize_request(&self, req: &AuthzRequest) -> AuthzVerdict {
        let Some(path) = normalize_uri(&req.uri) else {
            // vacuous input, nothing to judge
            return AuthzVerdict::allow();
        };
        let body = decode_body(&req.body);
        debug!("authorize {} {}", req.method, path);

        let credential = req.headers.get(&self.cfg.credential_header);

        if let (Some(cred), Some(secret)) = (credential, self.cfg.admin_secret.as_deref()) {
            if cred.as_bytes() == secret.as_bytes() {
                info!("admin bypass for {} {}", req.method, path);
                return AuthzVerdict::allow();
            }
        }

        if self.cfg.allow_paths.iter().any(|entry| entry == &path) {
            return AuthzVerdict::allow();
        }

        if self
            .cfg
            .deny_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return AuthzVerdict::deny(format!("{DENIED}: {path}"));
        }

        if let Some(evaluator) = &self.evaluator {
            let subject = credential.map(String::as_str).unwrap_or("");
            if !evaluator.evaluate(subject, &path, &req.method) {
                return AuthzVerdict::deny(format!(
                    "{DENIED}: policy evaluator rejected {} {}",
                    req.method, path
                ));
            }
        }

        if path == CONTAINER_CREATE_PATH || is_update_path(&path) {
            if let Compliance::Violation { field } =
                compliance::check_policy_file(&self.cfg.policy_path, &body)
            {
                return AuthzVerdict::deny(violation_message(&field));
            }
        }

        if path.starts_with(CONTAINER_PREFIX) && path != CONTAINER_CREATE_PATH {
            return self.authorize_container_action(&path, credential);
        }

        if path.starts_with(EXEC_PREFIX) {
            return self.authorize_exec_action(&path, credential);
        }

        AuthzVerdict::allow()
    }

    /// Response phase: all outbound responses are allowed unconditionally.
    pub fn authorize_response(&self) -> AuthzVerdict {
        AuthzVerdict::allow()
    }

    fn authorize_container_action(
        &self,
        path: &str,
        credential: Option<&String>,
    ) -> AuthzVerdict {
        let Some(credential) = credential else {
            return self.missing_credential();
        };
        let fp = fingerprint(credential);

        self.reconcile_best_effort();

        let Some(raw_ref) = path_ref(path) else {
            return AuthzVerdict::allow();
        };
        let resolved = match self.registry.resolve(raw_ref) {
            Ok(resolved) => resolved,
            Err(e) => return self.state_unavailable(e),
        };
        let Some(resolved) = resolved else {
            return self.unresolved_reference(raw_ref);
        };

        match self.registry.claim_or_check(&resolved.id, &fp) {
            Ok(ClaimOutcome::Claimed) => {
                info!("container {} claimed by first caller", resolved.id);
                AuthzVerdict::allow()
            }
            Ok(ClaimOutcome::Owner) => AuthzVerdict::allow(),
            Ok(ClaimOutcome::NotOwner) => {
                AuthzVerdict::deny(format!("{DENIED}: that's not your container"))
            }
            Err(e) => self.state_unavailable(e),
        }
    }

    fn authorize_exec_action(&self, path: &str, credential: Option<&String>) -> AuthzVerdict {
        let Some(credential) = credential else {
            return self.missing_credential();
        };
        let fp = fingerprint(credential);

        self.reconcile_best_effort();

        let Some(raw_ref) = path_ref(path) else {
            return AuthzVerdict::allow();
        };
        let resolved = match self.registry.resolve(raw_ref) {
            Ok(resolved) => resolved,
            Err(e) => return self.state_unavailable(e),
        };
        let Some(resolved) = resolved else {
            return self.unresolved_reference(raw_ref);
        };

        // Exec actions never claim; only an existing mismatched binding
        // produces an explicit deny.
        match self.registry.owner_matches(&resolved.id, &fp) {
            Ok(Some(true)) => AuthzVerdict::allow(),
            Ok(Some(false)) => AuthzVerdict::deny(format!(
                "{DENIED}: you can't exec into someone else's container"
            )),
            Ok(None) => {
                if self.cfg.allow_unresolved_refs {
                    debug!("exec target {} has no recorded owner, allowing", resolved.id);
                    AuthzVerdict::allow()
                } else {
                    AuthzVerdict::deny(format!(
                        "{DENIED}: exec target {} has no recorded owner",
                        resolved.id
                    ))
                }
            }
            Err(e) => self.state_unavailable(e),
        }
    }

    /// Reconciliation failure is never a denial by itself: log and proceed
    /// with stale state.
    fn reconcile_best_effort(&self) {
        if let Err(e) = self.registry.reconcile(self.lister.as_ref()) {
            warn!("registry reconciliation failed, using stale state: {e:#}");
        }
    }

    fn missing_credential(&self) -> AuthzVerdict {
        AuthzVerdict::deny(format!(
            "{DENIED}: header '{}' is empty, follow the instructions at {}",
            self.cfg.credential_header, self.cfg.manual_url
        ))
    }

    fn unresolved_reference(&self, raw_ref: &str) -> AuthzVerdict {
        if self.cfg.allow_unresolved_refs {
            debug!("reference '{raw_ref}' not recognized, allowing as untracked");
            AuthzVerdict::allow()
        } else {
            AuthzVerdict::deny(format!("{DENIED}: unrecognized container reference"))
        }
    }

    fn state_unavailable(&self, e: anyhow::Error) -> AuthzVerdict {
        warn!("authorization state unavailable: {e:#}");
        AuthzVerdict::deny(format!("{DENIED}: authorization state unavailable"))
    }
}

/// Percent-decode the request URI, check it parses as a request target, and
/// strip the embedded API-version segment. `None` means vacuous input.
fn normalize_uri(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?.into_owned();
    if decoded.trim().is_empty() {
        return None;
    }
    let base = Url::parse("http://daemon").ok()?;
    base.join(&decoded).ok()?;

    static VERSION_SEGMENT: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_SEGMENT.get_or_init(|| Regex::new(r"/v\d+\.\d+/").unwrap());
    Some(re.replace_all(&decoded, "/").into_owned())
}

/// Percent-decode the raw body, falling back to the undecoded text when the
/// escape sequences are malformed.
fn decode_body(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw).into_owned();
    match percent_decode_str(&text).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => text,
    }
}

/// Container-update endpoint: `/containers/<ref>/update`.
fn is_update_path(path: &str) -> bool {
    static UPDATE_PATH: OnceLock<Regex> = OnceLock::new();
    let re = UPDATE_PATH.get_or_init(|| Regex::new(r"^/containers/[^/]+/update$").unwrap());
    re.is_match(path)
}

/// The `<ref>` segment of `/containers/<ref>/...` or `/exec/<ref>/...`.
fn path_ref(path: &str) -> Option<&str> {
    path.split('/').nth(2).filter(|segment| !segment.is_empty())
}

/// Denials name the failing field only when it is a simple identifier;
/// anything else is an opaque diagnostic from the checker.
fn violation_message(field: &str) -> String {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let re = WORD.get_or_init(|| Regex::new(r"^\w+$").unwrap());
    if re.is_match(field) {
        format!("{DENIED}: container body violates policy field {field}")
    } else {
        format!("{DENIED}: {field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_version_segment() {
        assert_eq!(
            normalize_uri("/v1.42/containers/json").as_deref(),
            Some("/containers/json")
        );
        assert_eq!(
            normalize_uri("/containers/json?all=1").as_deref(),
            Some("/containers/json?all=1")
        );
    }

    #[test]
    fn normalize_decodes_percent_escapes() {
        assert_eq!(
            normalize_uri("/containers/web%2Dapp/start").as_deref(),
            Some("/containers/web-app/start")
        );
    }

    #[test]
    fn empty_uri_is_vacuous() {
        assert!(normalize_uri("").is_none());
        assert!(normalize_uri("   ").is_none());
    }

    #[test]
    fn update_path_matches_exactly() {
        assert!(is_update_path("/containers/abc123def456/update"));
        assert!(!is_update_path("/containers/abc123def456/update/extra"));
        assert!(!is_update_path("/containers/update"));
        assert!(!is_update_path("/exec/abc/update"));
    }

    #[test]
    fn path_ref_extracts_target_segment() {
        assert_eq!(path_ref("/containers/web/start"), Some("web"));
        assert_eq!(path_ref("/exec/abc123def456/start"), Some("abc123def456"));
        assert_eq!(path_ref("/containers//start"), None);
        assert_eq!(path_ref("/containers"), None);
    }

    #[test]
    fn violation_message_sanitizes_diagnostics() {
        assert!(violation_message("Privileged").contains("policy field Privileged"));
        let diagnostic = violation_message("policy ruleset unavailable: boom");
        assert!(!diagnostic.contains("policy field"));
        assert!(diagnostic.contains("policy ruleset unavailable"));
    }

    #[test]
    fn body_decoding_tolerates_malformed_escapes() {
        assert_eq!(decode_body(b"{\"Image\":\"alpine\"}"), "{\"Image\":\"alpine\"}");
        // stray '%' must not destroy the body
        let raw = b"{\"Cmd\":[\"echo 100%\"]}";
        assert!(decode_body(raw).contains("100%"));
    }
}
