//! Per-(player, match) session state machine.
//!
//! ```text
//! Ø ──create──▶ ACTIVE ──disconnect──▶ DISCONNECTED ──reconnect──▶ ACTIVE
//!              ACTIVE ──abandon──▶ ABANDONED
//!              DISCONNECTED ──(age > timeout)──▶ EXPIRED
//! ```
//!
//! At most one live session exists per `(player_id, match_id)`; expired and
//! abandoned sessions may be replaced by a fresh create.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sim_ecs::{MatchId, PlayerId, SimError};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Disconnected,
    Expired,
    Abandoned,
}

/// A player's membership in one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSession {
    pub id: i64,
    pub player_id: PlayerId,
    pub match_id: MatchId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SessionMap {
    sessions: HashMap<(PlayerId, MatchId), PlayerSession>,
    next_id: i64,
}

/// Store of sessions for one container.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<SessionMap>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session, replacing an expired or abandoned predecessor.
    ///
    /// A live (`ACTIVE` or `DISCONNECTED`) session for the same pair is a
    /// `Conflict`.
    pub fn create(&self, player_id: PlayerId, match_id: MatchId) -> Result<PlayerSession, SimError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.sessions.get(&(player_id, match_id)) {
            match existing.status {
                SessionStatus::Active | SessionStatus::Disconnected => {
                    return Err(SimError::Conflict(format!(
                        "player {player_id} already has a live session in match {match_id}"
                    )));
                }
                SessionStatus::Expired | SessionStatus::Abandoned => {
                    debug!(player_id, match_id, "replacing finished session");
                }
            }
        }
        inner.next_id += 1;
        let now = Utc::now();
        let session = PlayerSession {
            id: inner.next_id,
            player_id,
            match_id,
            status: SessionStatus::Active,
            created_at: now,
            last_activity_at: now,
            disconnected_at: None,
        };
        inner.sessions.insert((player_id, match_id), session.clone());
        info!(player_id, match_id, session_id = session.id, "session created");
        Ok(session)
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, player_id: PlayerId, match_id: MatchId) -> Option<PlayerSession> {
        self.inner.lock().sessions.get(&(player_id, match_id)).cloned()
    }

    /// Mark a session disconnected. On a non-active session this is a
    /// logged no-op.
    pub fn disconnect(&self, player_id: PlayerId, match_id: MatchId) -> Result<PlayerSession, SimError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&(player_id, match_id))
            .ok_or_else(|| SimError::NotFound(format!("session ({player_id}, {match_id})")))?;
        if session.status != SessionStatus::Active {
            debug!(player_id, match_id, status = ?session.status, "disconnect on non-active session ignored");
            return Ok(session.clone());
        }
        let now = Utc::now();
        session.status = SessionStatus::Disconnected;
        session.disconnected_at = Some(now);
        session.last_activity_at = now;
        Ok(session.clone())
    }

    /// Reconnect a disconnected session.
    pub fn reconnect(&self, player_id: PlayerId, match_id: MatchId) -> Result<PlayerSession, SimError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&(player_id, match_id))
            .ok_or_else(|| SimError::NotFound(format!("session ({player_id}, {match_id})")))?;
        if session.status != SessionStatus::Disconnected {
            return Err(SimError::InvalidState(format!(
                "cannot reconnect session in {:?}",
                session.status
            )));
        }
        session.status = SessionStatus::Active;
        session.disconnected_at = None;
        session.last_activity_at = Utc::now();
        Ok(session.clone())
    }

    /// Abandon an active session.
    pub fn abandon(&self, player_id: PlayerId, match_id: MatchId) -> Result<PlayerSession, SimError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&(player_id, match_id))
            .ok_or_else(|| SimError::NotFound(format!("session ({player_id}, {match_id})")))?;
        if session.status != SessionStatus::Active {
            return Err(SimError::InvalidState(format!(
                "cannot abandon session in {:?}",
                session.status
            )));
        }
        session.status = SessionStatus::Abandoned;
        session.last_activity_at = Utc::now();
        Ok(session.clone())
    }

    /// Expire every disconnected session older than `timeout`. Returns the
    /// number of sessions expired by this sweep.
    pub fn expire_stale(&self, timeout: Duration) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        let mut inner = self.inner.lock();
        for session in inner.sessions.values_mut() {
            if session.status != SessionStatus::Disconnected {
                continue;
            }
            let Some(disconnected_at) = session.disconnected_at else {
                continue;
            };
            if disconnected_at + timeout < now {
                session.status = SessionStatus::Expired;
                session.last_activity_at = now;
                expired += 1;
                info!(
                    player_id = session.player_id,
                    match_id = session.match_id,
                    "session expired"
                );
            }
        }
        expired
    }

    /// Number of tracked sessions, in any state.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}
