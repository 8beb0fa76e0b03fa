//! Session Registry
//!
//! Live sessions keyed by `"first_name:last_name"`. Each key owns an async
//! mutex, so one user's messages are processed strictly in order while other
//! users proceed in parallel. The map lock only guards slot lookup and is
//! never held across a model or store call.

use super::orchestrator::{ChatReply, Coach, History, Session};
use crate::db::SnapshotStore;
use crate::llm::ModelSpec;
use sdk::{EngineError, SaveReport, SessionSnapshot, UserIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

type Slot = Arc<Mutex<Option<Session>>>;

/// What `/init` returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitReply {
    pub messages: Vec<String>,
    pub responses: Vec<String>,
    pub meal_plan: String,
}

impl From<&SessionSnapshot> for InitReply {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            messages: snapshot.messages.clone(),
            responses: snapshot.responses.clone(),
            meal_plan: snapshot.meal_plan.clone(),
        }
    }
}

pub struct SessionRegistry {
    coach: Arc<Coach>,
    store: Arc<dyn SnapshotStore>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl SessionRegistry {
    pub fn new(coach: Arc<Coach>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            coach,
            store,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot_or_insert(&self, key: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(key) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn slot(&self, key: &str) -> Option<Slot> {
        self.slots.read().await.get(key).cloned()
    }

    /// Whether `slot` is still the one the map holds for `key`
    async fn is_current(&self, key: &str, slot: &Slot) -> bool {
        self.slots
            .read()
            .await
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Drop an emptied slot unless someone else is using it
    async fn prune(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.write().await;
        if let Some(current) = slots.get(key) {
            let idle = Arc::ptr_eq(current, slot)
                && current.try_lock().map(|s| s.is_none()).unwrap_or(false);
            if idle {
                slots.remove(key);
            }
        }
    }

    /// Number of live sessions
    pub async fn live_sessions(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }

    /// Bind a session to `identity`, creating the user on first contact.
    ///
    /// A session already live for the identity is flushed first; if that
    /// flush fails or is rejected the old session stays and an error is
    /// returned.
    pub async fn open(&self, identity: &UserIdentity) -> Result<InitReply, EngineError> {
        let key = identity.key();
        let mut guard = loop {
            let slot = self.slot_or_insert(&key).await;
            let guard = Arc::clone(&slot).lock_owned().await;
            // a concurrent close may have pruned the slot while we waited
            if self.is_current(&key, &slot).await {
                break guard;
            }
            tracing::debug!(user = %identity, "Slot pruned during open; retrying");
        };

        if let Some(previous) = guard.as_mut() {
            tracing::info!(user = %identity, "Flushing previous session before re-init");
            let report = previous.close(&self.coach, self.store.as_ref()).await?;
            if !can_release(previous, &report) {
                tracing::warn!(user = %identity, "Previous session kept: {}", report.message);
                return Err(EngineError::Persistence(report.message));
            }
        }

        let snapshot = match self.store.find_user(identity).await? {
            Some(snapshot) => snapshot,
            None => self.store.create_user(identity).await?,
        };

        let reply = InitReply::from(&snapshot);
        *guard = Some(Session::from_snapshot(identity.clone(), snapshot));
        Ok(reply)
    }

    /// Run one message through the identity's live session
    pub async fn chat(
        &self,
        identity: &UserIdentity,
        message: &str,
        model: Option<&ModelSpec>,
    ) -> Result<ChatReply, EngineError> {
        let unauthorized = || EngineError::Unauthorized(format!("no active session for {}", identity));

        let slot = self.slot(&identity.key()).await.ok_or_else(unauthorized)?;
        let mut guard = slot.lock().await;
        let session = guard.as_mut().ok_or_else(unauthorized)?;

        Ok(session.chat(&self.coach, message, model).await)
    }

    /// Flush and release the identity's session.
    ///
    /// The session leaves the pool once its dialogue is stored, or when it had
    /// none. A store error or a rejected save with dialogue keeps it live so
    /// the close can be retried.
    pub async fn close(&self, identity: &UserIdentity) -> Result<SaveReport, EngineError> {
        let key = identity.key();
        let not_found = || EngineError::SessionNotFound(identity.to_string());

        let slot = self.slot(&key).await.ok_or_else(not_found)?;
        let (report, released) = {
            let mut guard = slot.lock().await;
            let session = guard.as_mut().ok_or_else(not_found)?;
            let report = session.close(&self.coach, self.store.as_ref()).await?;
            let released = can_release(session, &report);
            if released {
                *guard = None;
            } else {
                tracing::warn!(user = %identity, "Save rejected, session kept: {}", report.message);
            }
            (report, released)
        };

        if released {
            self.prune(&key, &slot).await;
        }
        Ok(report)
    }

    /// Last `limit` exchanges and the summary, live session first, then the store
    pub async fn history(
        &self,
        identity: &UserIdentity,
        limit: usize,
    ) -> Result<History, EngineError> {
        if let Some(slot) = self.slot(&identity.key()).await {
            if let Some(session) = slot.lock().await.as_ref() {
                return Ok(session.history(limit));
            }
        }

        let snapshot = self
            .store
            .find_user(identity)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(identity.to_string()))?;
        Ok(History::from_snapshot(&snapshot, limit))
    }

    /// Append a feedback exchange to the live session
    pub async fn feedback(
        &self,
        identity: &UserIdentity,
        feedback: &serde_json::Value,
    ) -> Result<(), EngineError> {
        let unauthorized = || EngineError::Unauthorized(format!("no active session for {}", identity));

        let slot = self.slot(&identity.key()).await.ok_or_else(unauthorized)?;
        let mut guard = slot.lock().await;
        guard
            .as_mut()
            .ok_or_else(unauthorized)?
            .record_feedback(feedback);
        Ok(())
    }

    /// Close every live session; used on shutdown. Failures are logged and skipped.
    pub async fn close_all(&self) -> usize {
        let entries: Vec<(String, Slot)> = self
            .slots
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut closed = 0;
        for (key, slot) in entries {
            let mut guard = slot.lock().await;
            let Some(session) = guard.as_mut() else {
                continue;
            };
            match session.close(&self.coach, self.store.as_ref()).await {
                Ok(report) if can_release(session, &report) => {
                    *guard = None;
                    closed += 1;
                }
                Ok(report) => {
                    tracing::error!("Session {} not saved on shutdown: {}", key, report.message)
                }
                Err(e) => tracing::error!("Failed to flush session {} on shutdown: {}", key, e),
            }
        }
        closed
    }
}

/// A session may leave the pool once its dialogue is stored or it had none
fn can_release(session: &Session, report: &SaveReport) -> bool {
    report.success || session.window().is_empty()
}
