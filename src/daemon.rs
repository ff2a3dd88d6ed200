//! Container-listing seam to the runtime daemon.
//!
//! The real daemon client is an external collaborator; the gate only needs
//! one operation from it: enumerate every container the daemon knows about,
//! including stopped ones. `InMemoryContainerLister` stands in for the
//! daemon in tests and embedded setups.

use std::sync::Mutex;

use anyhow::{anyhow, Result};

/// One row of the daemon's container listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Full daemon-assigned identifier (64 lowercase hex chars).
    pub id: String,
    /// Display names; the daemon may prepend a path-style `/`.
    pub names: Vec<String>,
}

impl ContainerSummary {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            names: vec![name.into()],
        }
    }
}

/// Enumerates the daemon's complete container set.
pub trait ContainerLister: Send + Sync {
    /// List every container, including stopped ones (`docker ps -a`).
    fn list_all(&self) -> Result<Vec<ContainerSummary>>;
}

/// In-memory lister backing tests and embedded use.
pub struct InMemoryContainerLister {
    containers: Mutex<Vec<ContainerSummary>>,
}

impl InMemoryContainerLister {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_containers(containers: Vec<ContainerSummary>) -> Self {
        Self {
            containers: Mutex::new(containers),
        }
    }

    /// Replace the full container set.
    pub fn set_containers(&self, containers: Vec<ContainerSummary>) -> Result<()> {
        let mut guard = self
            .containers
            .lock()
            .map_err(|_| anyhow!("container lister lock poisoned"))?;
        *guard = containers;
        Ok(())
    }

    pub fn add(&self, id: impl Into<String>, name: impl Into<String>) -> Result<()> {
        let mut guard = self
            .containers
            .lock()
            .map_err(|_| anyhow!("container lister lock poisoned"))?;
        guard.push(ContainerSummary::new(id, name));
        Ok(())
    }

    /// Remove a container by full id. Missing ids are ignored.
    pub fn remove(&self, id: &str) -> Result<()> {
        let mut guard = self
            .containers
            .lock()
            .map_err(|_| anyhow!("container lister lock poisoned"))?;
        guard.retain(|c| c.id != id);
        Ok(())
    }
}

impl Default for InMemoryContainerLister {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerLister for InMemoryContainerLister {
    fn list_all(&self) -> Result<Vec<ContainerSummary>> {
        let guard = self
            .containers
            .lock()
            .map_err(|_| anyhow!("container lister lock poisoned"))?;
        Ok(guard.clone())
    }
}
