//! Fleet-wide container directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use sim_ecs::SimError;

use crate::config::ContainerConfig;
use crate::container::{ContainerStatus, SimContainer};

/// Owns every execution container of one deployment.
pub struct ContainerManager {
    resource_root: PathBuf,
    containers: DashMap<i64, Arc<SimContainer>>,
    next_id: AtomicI64,
}

impl std::fmt::Debug for ContainerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerManager")
            .field("containers", &self.containers.len())
            .finish_non_exhaustive()
    }
}

impl Default for ContainerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerManager {
    /// A manager rooting container resources under `resources/`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_resource_root("resources")
    }

    /// A manager with an explicit resource root.
    #[must_use]
    pub fn with_resource_root(root: impl Into<PathBuf>) -> Self {
        Self {
            resource_root: root.into(),
            containers: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Allocate an id and register a new container in `CREATED` state.
    pub fn create_container(&self, config: ContainerConfig) -> Result<Arc<SimContainer>, SimError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let container = Arc::new(SimContainer::new(id, config, self.resource_root.clone())?);
        self.containers.insert(id, container.clone());
        info!(container = id, name = container.name(), "container created");
        Ok(container)
    }

    /// Look up a container by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<Arc<SimContainer>> {
        self.containers.get(&id).map(|c| c.clone())
    }

    /// Find a container by name. Linear scan; names are not unique keys.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<SimContainer>> {
        self.containers
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.clone())
    }

    /// Every container in the fleet.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<SimContainer>> {
        self.containers.iter().map(|c| c.clone()).collect()
    }

    /// Number of containers in the directory.
    #[must_use]
    pub fn count(&self) -> usize {
        self.containers.len()
    }

    /// Remove a stopped container from the directory.
    pub fn delete_container(&self, id: i64) -> Result<(), SimError> {
        let container = self
            .get(id)
            .ok_or_else(|| SimError::NotFound(format!("container {id}")))?;
        if container.status() != ContainerStatus::Stopped {
            return Err(SimError::InvalidState(format!(
                "container {id} must be STOPPED before delete, is {}",
                container.status()
            )));
        }
        self.containers.remove(&id);
        info!(container = id, "container deleted");
        Ok(())
    }

    /// Stop every container, swallowing per-container failures, then clear
    /// the directory.
    pub async fn shutdown_all(&self) {
        let containers = self.list();
        info!(count = containers.len(), "shutting down all containers");
        for container in containers {
            if let Err(e) = container.stop().await {
                warn!(container = container.id(), error = %e, "container failed to stop");
            }
        }
        self.containers.clear();
    }
}
