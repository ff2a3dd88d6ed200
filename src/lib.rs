//! Container Authorization Gate
//!
//! This crate implements an inline authorization gate for container-runtime
//! API requests. It sits on the request path between a client and the daemon,
//! inspects method, path, headers, and body, and returns an allow/deny verdict
//! before the daemon executes the operation.
//!
//! # Decision path
//!
//! Every request passes once through the [`engine::DecisionEngine`]:
//!
//! 1. **Normalization**: percent-decode the URI and body, strip the embedded
//!    API-version segment. Empty or unparseable URIs are vacuous and allowed.
//! 2. **Admin bypass**: a credential header byte-equal to the configured
//!    admin secret is trusted unconditionally.
//! 3. **Static tables**: exact allow-list match, then deny-list prefix match.
//! 4. **Compliance**: container-creation and update bodies are validated
//!    against the tabular policy ruleset; an unverifiable body fails closed.
//! 5. **Ownership**: container- and exec-targeted actions are judged by
//!    first-claim semantics keyed on the caller's credential fingerprint.
//! 6. Everything else is allowed.
//!
//! # State
//!
//! The only mutable state is the in-memory [`registry::IdentityRegistry`]:
//! id-to-name and id-to-owner maps rebuilt opportunistically from the live
//! container list. Nothing persists across process restarts by design.
//!
//! # Module Structure
//!
//! - `config`: gate configuration (file + environment)
//! - `daemon`: the container-listing seam to the runtime daemon
//! - `registry`: identity registry (reconcile, resolve, claim)
//! - `policy` / `compliance`: declarative body checks for creation requests
//! - `engine`: top-level request classifier producing the verdict
//! - `eval`: optional external policy-evaluator extension point

use sha2::{Digest, Sha256};

pub mod compliance;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod eval;
pub mod policy;
pub mod registry;

pub use compliance::Compliance;
pub use config::GateConfig;
pub use daemon::{ContainerLister, ContainerSummary, InMemoryContainerLister};
pub use engine::{AuthzRequest, AuthzVerdict, DecisionEngine};
pub use eval::AccessEvaluator;
pub use policy::{load_rules, PolicyRule, RuleKind};
pub use registry::{ClaimOutcome, IdentityRegistry, Resolved};

/// Length of the canonical short container id used as the registry key.
pub const CANONICAL_ID_LEN: usize = 12;

/// Length of a full daemon-assigned container id.
pub const FULL_ID_LEN: usize = 64;

/// One-way fingerprint of a caller credential.
///
/// The raw credential never reaches the registry; only its hex-encoded
/// SHA-256 digest is stored as the recorded owner of a container.
pub fn fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    hex::encode(digest)
}

/// Truncate a container reference to the canonical short form.
///
/// References shorter than the canonical length pass through unchanged.
/// Safe on arbitrary caller input, including non-ASCII.
pub fn short_id(raw: &str) -> &str {
    match raw.char_indices().nth(CANONICAL_ID_LEN) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
