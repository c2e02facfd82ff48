//! In-memory table of live training sessions.

use crate::{
    catalog::Scenario,
    error::SessionError,
    session::{Orchestrator, TrainingSession},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Owns every live session, keyed by id.
///
/// Sessions are dropped on reset, or once they sit idle longer than the
/// configured limit. Idle sessions are swept whenever a new one starts.
pub struct SessionRegistry {
    orchestrator: Orchestrator,
    sessions: RwLock<HashMap<Uuid, Arc<TrainingSession>>>,
    idle_limit: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            sessions: RwLock::new(HashMap::new()),
            idle_limit: None,
        }
    }

    /// Evicts sessions idle for at least `limit`; `None` keeps them forever.
    pub fn with_idle_limit(mut self, limit: Option<Duration>) -> Self {
        self.idle_limit = limit;
        self
    }

    /// Starts a session and registers it once the opening line arrived.
    pub async fn start(&self, scenario: Scenario) -> Result<Arc<TrainingSession>, SessionError> {
        self.evict_idle().await;
        let session = Arc::new(self.orchestrator.start_session(scenario).await?);
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<TrainingSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Discards a session, cancelling any outstanding call. Unknown ids are
    /// ignored; returns whether a session was removed.
    pub async fn reset(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(session) => {
                session.cancel();
                info!(session_id = %id, "Session reset");
                true
            }
            None => false,
        }
    }

    /// Drops sessions past the idle limit. Busy sessions are never evicted.
    /// Returns the number removed.
    pub async fn evict_idle(&self) -> usize {
        let Some(limit) = self.idle_limit else {
            return 0;
        };
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_busy() || session.idle_for() < limit);
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Evicted idle sessions");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
