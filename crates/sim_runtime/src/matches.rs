//! Match records bound to one container.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use sim_ecs::{MatchId, SimError};

/// A match hosted by a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    /// Stamped by the registry on create.
    #[serde(default)]
    pub container_id: i64,
    #[serde(default)]
    pub enabled_modules: Vec<String>,
    #[serde(default)]
    pub enabled_ais: Vec<String>,
}

impl Match {
    /// A match record with no modules enabled yet.
    #[must_use]
    pub fn new(id: MatchId) -> Self {
        Self {
            id,
            container_id: 0,
            enabled_modules: Vec::new(),
            enabled_ais: Vec::new(),
        }
    }
}

/// CRUD over the matches of one container.
#[derive(Debug, Clone)]
pub struct MatchRegistry {
    container_id: i64,
    matches: Arc<DashMap<MatchId, Match>>,
}

impl MatchRegistry {
    /// Create an empty registry for a container.
    #[must_use]
    pub fn new(container_id: i64) -> Self {
        Self {
            container_id,
            matches: Arc::new(DashMap::new()),
        }
    }

    /// Persist a match, stamping the owning container id.
    ///
    /// Match ids must stay exactly representable in the ECS's f32 match
    /// column; ids beyond that range are rejected rather than silently
    /// rounded.
    pub fn create(&self, mut m: Match) -> Result<Match, SimError> {
        if (m.id as f32) as MatchId != m.id {
            return Err(SimError::InvalidRequest(format!(
                "match id {} is not exactly representable as f32",
                m.id
            )));
        }
        if self.matches.contains_key(&m.id) {
            return Err(SimError::Conflict(format!("match {} already exists", m.id)));
        }
        m.container_id = self.container_id;
        self.matches.insert(m.id, m.clone());
        Ok(m)
    }

    /// Look up a match by id.
    pub fn get(&self, id: MatchId) -> Result<Match, SimError> {
        self.matches
            .get(&id)
            .map(|m| m.clone())
            .ok_or_else(|| SimError::NotFound(format!("match {id}")))
    }

    /// All matches, in unspecified order.
    #[must_use]
    pub fn list(&self) -> Vec<Match> {
        self.matches.iter().map(|m| m.clone()).collect()
    }

    /// Delete a match record.
    pub fn delete(&self, id: MatchId) -> Result<(), SimError> {
        self.matches
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SimError::NotFound(format!("match {id}")))
    }

    /// Number of matches.
    #[must_use]
    pub fn count(&self) -> usize {
        self.matches.len()
    }
}
