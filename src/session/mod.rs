//! Per-user session state and the registry that isolates sessions.

pub mod controller;

pub use controller::SessionController;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AssistantDirectory;
use crate::conversation::ConversationStore;
use crate::hazards::HazardTable;

/// Everything one user owns for the lifetime of their session.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    credential: Option<SecretString>,
    pub conversations: ConversationStore,
    /// Table from the most recent successful upload.
    pub hazards: Option<HazardTable>,
    /// Key of the selected assistant.
    pub active: String,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(directory: &AssistantDirectory, credential: Option<SecretString>) -> Self {
        Self {
            id: Uuid::new_v4(),
            credential,
            conversations: ConversationStore::new(directory.labels()),
            hazards: None,
            active: directory.default_profile().key.clone(),
            last_active: Utc::now(),
        }
    }

    pub fn credential(&self) -> Option<&SecretString> {
        self.credential.as_ref()
    }

    pub fn set_credential(&mut self, credential: SecretString) {
        self.credential = Some(credential);
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_active).to_std().unwrap_or_default()
    }
}

/// A registered session plus the gate that keeps its invocations serial.
#[derive(Debug)]
pub struct SessionSlot {
    pub state: Mutex<Session>,
    /// Held for the duration of an assistant invocation.
    pub invoke_gate: Mutex<()>,
}

/// All live sessions. Each session is locked independently, so one user's
/// in-flight run never blocks another's.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionSlot>>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a session and return its id.
    pub async fn insert(&self, session: Session) -> Uuid {
        let id = session.id;
        let slot = Arc::new(SessionSlot {
            state: Mutex::new(session),
            invoke_gate: Mutex::new(()),
        });
        self.sessions.write().await.insert(id, slot);
        info!(session_id = %id, "Session started");
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionSlot>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// End a session, dropping its history. Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(session_id = %id, "Session ended");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// End sessions idle longer than `idle_timeout`. Sessions with a run in
    /// flight are skipped. Returns how many were ended.
    pub async fn prune_idle(&self, idle_timeout: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|id, slot| {
            if slot.invoke_gate.try_lock().is_err() {
                return true;
            }
            match slot.state.try_lock() {
                Ok(session) if session.idle_for(now) > idle_timeout => {
                    debug!(session_id = %id, "Session idle, ending");
                    false
                }
                _ => true,
            }
        });

        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(count = pruned, "Ended idle sessions");
        }
        pruned
    }
}

/// Spawn the background sweep that ends idle sessions.
pub fn spawn_idle_sweep(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            registry.prune_idle(idle_timeout).await;
        }
    })
}
