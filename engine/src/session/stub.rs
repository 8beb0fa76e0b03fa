//! Scripted gateway for unit tests

use crate::llm::{CompletionRequest, Gateway, LLMError, Purpose, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Replies per purpose: queued replies first, then the fallback for that purpose
#[derive(Default)]
pub struct StubGateway {
    queued: Mutex<HashMap<Purpose, VecDeque<Result<String>>>>,
    fallback: HashMap<Purpose, String>,
    calls: Mutex<Vec<(Purpose, String)>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
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

    pub fn calls(&self) -> Vec<(Purpose, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, purpose: Purpose) -> usize {
        self.calls().iter().filter(|(p, _)| *p == purpose).count()
    }
}

#[async_trait]
impl Gateway for StubGateway {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((request.purpose, request.instruction.clone()));

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
            .ok_or_else(|| LLMError::ProviderUnavailable(format!("no script for {}", request.purpose)))
    }
}
