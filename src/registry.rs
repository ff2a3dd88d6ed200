//! Identity registry: the gate's only mutable state.
//!
//! Two associative maps share the canonical short-id key space: id-to-name
//! and id-to-owner-fingerprint. A single lock guards both so reconciliation's
//! read-prune-write sequence and the ownership first-claim step are atomic.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use log::{debug, info};

use crate::daemon::ContainerLister;
use crate::{short_id, CANONICAL_ID_LEN, FULL_ID_LEN};

/// Outcome of the atomic check-and-bind ownership step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The id had no recorded owner; the caller's fingerprint is now bound.
    Claimed,
    /// The recorded owner matches the caller.
    Owner,
    /// The recorded owner is a different caller.
    NotOwner,
}

/// A successfully resolved container reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Canonical 12-character id.
    pub id: String,
    /// True when the reference matched a registered display name.
    pub matched_by_name: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// id -> display name. The first observed name for an id is authoritative.
    names: HashMap<String, String>,
    /// id -> owner credential fingerprint.
    owners: HashMap<String, String>,
}

/// Process-wide container identity and ownership state.
///
/// Empty at startup; rebuilt lazily from the live container list as requests
/// arrive. Entries are deleted only when reconciliation confirms a container
/// is gone from the daemon.
pub struct IdentityRegistry {
    state: Mutex<RegistryState>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("identity registry lock poisoned"))
    }

    /// Refresh the registry against the daemon's live container set.
    ///
    /// Name bindings are inserted only if absent; ids no longer present in
    /// the live set are pruned from both maps. If the listing call fails the
    /// registry is left untouched and the error is surfaced; callers log it
    /// and proceed with stale state rather than failing the request.
    pub fn reconcile(&self, lister: &dyn ContainerLister) -> Result<()> {
        // List before taking the lock: a failed listing must not disturb
        // existing state, and the daemon call is the only slow part.
        let containers = lister.list_all()?;

        let mut state = self.lock()?;
        let mut live: HashSet<String> = HashSet::with_capacity(containers.len());
        for container in &containers {
            let id = short_id(&container.id).to_string();
            let name = container
                .names
                .first()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default();
            live.insert(id.clone());
            state.names.entry(id).or_insert(name);
        }

        let stale: Vec<String> = state
            .names
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        for id in stale {
            state.names.remove(&id);
            if state.owners.remove(&id).is_some() {
                info!("pruned ownership binding for removed container {id}");
            } else {
                debug!("pruned name binding for removed container {id}");
            }
        }
        Ok(())
    }

    /// Map a caller-supplied reference (full id, short id, ambiguous prefix,
    /// or registered name) to the canonical id.
    ///
    /// `None` means the reference is not recognized: a policy outcome for
    /// the caller to judge, not an error.
    pub fn resolve(&self, raw: &str) -> Result<Option<Resolved>> {
        let state = self.lock()?;

        // Exact display-name match wins over everything.
        if let Some(id) = state
            .names
            .iter()
            .find_map(|(id, name)| (name.as_str() == raw).then(|| id.clone()))
        {
            return Ok(Some(Resolved {
                id,
                matched_by_name: true,
            }));
        }

        let len = raw.chars().count();
        if len != CANONICAL_ID_LEN && len != FULL_ID_LEN {
            // Treat as a possible short prefix. Iteration order over the map
            // is unordered, so two owned ids sharing the prefix resolve
            // arbitrarily; a known limitation of prefix references.
            let prefix = short_id(raw);
            if prefix.is_empty() {
                return Ok(None);
            }
            let hit = state
                .owners
                .keys()
                .find(|id| id.starts_with(prefix))
                .cloned();
            return Ok(hit.map(|id| Resolved {
                id,
                matched_by_name: false,
            }));
        }

        Ok(Some(Resolved {
            id: short_id(raw).to_string(),
            matched_by_name: false,
        }))
    }

    /// Atomic first-claim / same-owner check for container-targeted actions.
    ///
    /// Exactly one of N concurrent callers can claim a never-before-seen id;
    /// the rest are judged against the winning fingerprint.
    pub fn claim_or_check(&self, id: &str, fp: &str) -> Result<ClaimOutcome> {
        let mut state = self.lock()?;
        match state.owners.get(id) {
            Some(existing) if existing == fp => Ok(ClaimOutcome::Owner),
            Some(_) => Ok(ClaimOutcome::NotOwner),
            None => {
                state.owners.insert(id.to_string(), fp.to_string());
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    /// Read-only ownership check for exec-targeted actions.
    ///
    /// `None` means the id has no recorded owner; exec actions never claim.
    pub fn owner_matches(&self, id: &str, fp: &str) -> Result<Option<bool>> {
        let state = self.lock()?;
        Ok(state.owners.get(id).map(|existing| existing == fp))
    }

    /// Snapshot of both maps, primarily for tests and diagnostics.
    pub fn snapshot(&self) -> Result<(HashMap<String, String>, HashMap<String, String>)> {
        let state = self.lock()?;
        Ok((state.names.clone(), state.owners.clone()))
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
