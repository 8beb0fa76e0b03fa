//! Shared fixtures: a scripted model gateway and an in-memory snapshot store
#![allow(dead_code)]

use async_trait::async_trait;
use pt_engine::config::Config;
use pt_engine::db::SnapshotStore;
use pt_engine::llm::{CompletionRequest, Gateway, LLMError, Purpose, Result};
use pt_engine::session::{Coach, SessionRegistry};
use sdk::{EngineError, SaveReport, SessionSnapshot, UserIdentity};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const IN_SCOPE: &str = r#"{"reasoning": "nutrition question", "is_health_related": true}"#;
pub const OUT_OF_SCOPE: &str = r#"{"reasoning": "small talk", "is_health_related": false}"#;

/// Gateway answering by purpose: queued replies first, then a fixed fallback
#[derive(Default)]
pub struct ScriptedGateway {
    queued: Mutex<HashMap<Purpose, VecDeque<Result<String>>>>,
    fallback: HashMap<Purpose, String>,
    stalls: Mutex<HashMap<Purpose, VecDeque<Duration>>>,
    calls: Mutex<Vec<Purpose>>,
}

impl ScriptedGateway {
    /// In scope, "Eat oats.", no plan change, empty fact diff
    pub fn healthy() -> Self {
        Self::default()
            .always(Purpose::Guardrail, IN_SCOPE)
            .always(Purpose::Answer, "Eat oats.")
            .always(Purpose::PlanCheck, "False")
            .always(Purpose::Summary, "User asks about breakfast.")
            .always(Purpose::Facts, "{}")
    }

    pub fn always(mut self, purpose: Purpose, reply: &str) -> Self {
        self.fallback.insert(purpose, reply.to_string());
        self
    }

    pub fn then(self, purpose: Purpose, reply: Result<String>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(reply);
        self
    }

    /// Delay the next call for `purpose` before it replies
    pub fn stall(self, purpose: Purpose, delay: Duration) -> Self {
        self.stalls
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(delay);
        self
    }

    pub fn count(&self, purpose: Purpose) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| **p == purpose)
            .count()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.calls.lock().unwrap().push(request.purpose);

        let stall = self
            .stalls
            .lock()
            .unwrap()
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front);
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }

        self.fallback
            .get(&request.purpose)
            .cloned()
            .ok_or_else(|| LLMError::ProviderUnavailable(format!("unscripted {}", request.purpose)))
    }
}

/// Snapshot store kept in a map, with the same rejection rules as SQLite
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, SessionSnapshot>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn snapshot(&self, identity: &UserIdentity) -> Option<SessionSnapshot> {
        self.users.lock().unwrap().get(&identity.key()).cloned()
    }

    pub fn seed(&self, identity: &UserIdentity, snapshot: SessionSnapshot) {
        self.users.lock().unwrap().insert(identity.key(), snapshot);
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Drop a stored user, as if the row were deleted underneath a session
    pub fn forget(&self, identity: &UserIdentity) {
        self.users.lock().unwrap().remove(&identity.key());
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn find_user(
        &self,
        identity: &UserIdentity,
    ) -> std::result::Result<Option<SessionSnapshot>, EngineError> {
        Ok(self.snapshot(identity))
    }

    async fn create_user(
        &self,
        identity: &UserIdentity,
    ) -> std::result::Result<SessionSnapshot, EngineError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .entry(identity.key())
            .or_default()
            .clone())
    }

    async fn save_user(
        &self,
        identity: &UserIdentity,
        snapshot: &SessionSnapshot,
    ) -> std::result::Result<SaveReport, EngineError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::Database("disk full".to_string()));
        }
        if snapshot.has_no_dialogue() {
            return Ok(SaveReport::rejected("No user data to save"));
        }

        let mut users = self.users.lock().unwrap();
        match users.get_mut(&identity.key()) {
            Some(stored) => {
                *stored = snapshot.clone();
                self.saves.fetch_add(1, Ordering::SeqCst);
                Ok(SaveReport::saved())
            }
            None => Ok(SaveReport::rejected("User not found")),
        }
    }
}

pub fn ana() -> UserIdentity {
    UserIdentity::new("Ana", "Lee").unwrap()
}

pub fn coach(gateway: Arc<ScriptedGateway>) -> Coach {
    Coach::from_config(&Config::default(), gateway).unwrap()
}

pub fn registry(gateway: Arc<ScriptedGateway>, store: Arc<MemoryStore>) -> SessionRegistry {
    SessionRegistry::new(Arc::new(coach(gateway)), store)
}
