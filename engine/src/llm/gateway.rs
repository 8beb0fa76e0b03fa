//! Model Gateway
//!
//! One entry point for every model call the session makes. The gateway picks
//! the backend from the request's `ModelSpec`, bounds the call with the
//! configured timeout and returns raw text. Two helpers sit on top:
//!
//! - [`generate_json`] parses structured output and issues exactly one repair
//!   call when the first reply is not valid JSON of the expected shape.
//! - [`generate_answer`] turns any failure into the degraded reply, since the
//!   user-facing answer is the only call that must always produce text.

use super::{parse_json_output, LLMError, Message, ModelSpec, ProviderFactory};
use crate::secrets::scrub;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reply used when the answer model cannot be reached
pub const DEGRADED_REPLY: &str = "The model is currently down. Please try again later.";

/// Reply used when the answer model returns nothing
pub const EMPTY_ANSWER_REPLY: &str =
    "I am not sure how to respond to that. Can you please rephrase your question?";

/// Why a model is being called. Only used for logging and test scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Guardrail,
    Answer,
    Summary,
    Facts,
    PlanCheck,
    PlanRevise,
    Repair,
    Evaluate,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Purpose::Guardrail => "guardrail",
            Purpose::Answer => "answer",
            Purpose::Summary => "summary",
            Purpose::Facts => "facts",
            Purpose::PlanCheck => "plan_check",
            Purpose::PlanRevise => "plan_revise",
            Purpose::Repair => "repair",
            Purpose::Evaluate => "evaluate",
        };
        f.write_str(name)
    }
}

/// A single model call: optional persona, prior turns, then the instruction turn
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub purpose: Purpose,
    pub model: &'a ModelSpec,
    pub system: Option<&'a str>,
    pub context: &'a [Message],
    pub instruction: String,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(purpose: Purpose, model: &'a ModelSpec, instruction: impl Into<String>) -> Self {
        Self {
            purpose,
            model,
            system: None,
            context: &[],
            instruction: instruction.into(),
        }
    }

    pub fn with_system(mut self, system: &'a str) -> Self {
        self.system = Some(system);
        self
    }

    pub fn with_context(mut self, context: &'a [Message]) -> Self {
        self.context = context;
        self
    }

    /// Flatten into the message list a provider receives
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.context.len() + 2);
        if let Some(system) = self.system {
            messages.push(Message::system(system));
        }
        messages.extend_from_slice(self.context);
        messages.push(Message::user(self.instruction.clone()));
        messages
    }
}

/// Capability the session depends on for all text generation
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Return the raw text of the model's reply
    async fn complete(&self, request: &CompletionRequest<'_>) -> super::Result<String>;
}

/// Gateway over real providers, built per call
pub struct ModelGateway {
    factory: Arc<dyn ProviderFactory>,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(factory: Arc<dyn ProviderFactory>, timeout: Duration) -> Self {
        Self { factory, timeout }
    }
}

#[async_trait]
impl Gateway for ModelGateway {
    async fn complete(&self, request: &CompletionRequest<'_>) -> super::Result<String> {
        let provider = self.factory.build(request.model)?;
        let messages = request.messages();

        tracing::debug!(
            purpose = %request.purpose,
            model = %request.model,
            messages = messages.len(),
            chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Model request"
        );

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, provider.complete(&messages)).await {
            Ok(Ok(text)) => {
                tracing::debug!(
                    purpose = %request.purpose,
                    provider = provider.name(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model replied"
                );
                Ok(text)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    purpose = %request.purpose,
                    provider = provider.name(),
                    "Model call failed: {}",
                    scrub(&e.to_string())
                );
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    purpose = %request.purpose,
                    provider = provider.name(),
                    "Model call timed out after {}s",
                    self.timeout.as_secs()
                );
                Err(LLMError::Timeout)
            }
        }
    }
}

/// Free-text generation
pub async fn generate_text(
    gateway: &dyn Gateway,
    request: &CompletionRequest<'_>,
) -> super::Result<String> {
    gateway.complete(request).await
}

/// Structured generation with one repair attempt.
///
/// The first reply is parsed and deserialized into `T`. If either step fails,
/// the model is asked once to reformat its own output as bare JSON. A second
/// failure is returned as `LLMError::ParseError`.
pub async fn generate_json<T: DeserializeOwned>(
    gateway: &dyn Gateway,
    request: &CompletionRequest<'_>,
) -> super::Result<T> {
    let first = gateway.complete(request).await?;
    if let Some(value) = decode::<T>(&first) {
        return Ok(value);
    }

    tracing::debug!(purpose = %request.purpose, "Structured output malformed, asking for repair");

    let repair = CompletionRequest::new(
        Purpose::Repair,
        request.model,
        format!(
            "Please reformat the following as a valid JSON object.\n\
             RETURN ONLY THE REFORMATTED JSON OBJECT\n\n{}",
            first.trim()
        ),
    );
    let second = gateway.complete(&repair).await?;

    decode::<T>(&second).ok_or_else(|| {
        LLMError::ParseError(format!(
            "{} output was not valid JSON after one repair attempt",
            request.purpose
        ))
    })
}

fn decode<T: DeserializeOwned>(text: &str) -> Option<T> {
    let value = parse_json_output(text)?;
    serde_json::from_value(value).ok()
}

/// Result of the user-facing answer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Text(String),
    /// The model could not produce a reply; nothing about the turn should be kept
    Degraded,
}

impl Generated {
    /// What the user sees
    pub fn reply(&self) -> &str {
        match self {
            Generated::Text(text) => text,
            Generated::Degraded => DEGRADED_REPLY,
        }
    }

    /// Normalize a successful answer; blank output becomes the rephrase prompt
    pub fn from_answer(text: String) -> Self {
        if text.trim().is_empty() {
            Generated::Text(EMPTY_ANSWER_REPLY.to_string())
        } else {
            Generated::Text(text)
        }
    }
}

/// Answer generation: never fails, degrades instead
pub async fn generate_answer(gateway: &dyn Gateway, request: &CompletionRequest<'_>) -> Generated {
    match gateway.complete(request).await {
        Ok(text) => Generated::from_answer(text),
        Err(e) => {
            tracing::warn!(
                model = %request.model,
                unavailable = e.is_unavailable(),
                "Answer degraded: {}",
                scrub(&e.to_string())
            );
            Generated::Degraded
        }
    }
}
