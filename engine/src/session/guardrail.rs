//! Guardrail Classifier
//!
//! Gates every inbound message on whether it is health, fitness or nutrition
//! related. Fails closed: anything other than a clean "yes" rejects.

use super::prompts;
use crate::llm::{generate_json, CompletionRequest, Gateway, ModelSpec, Purpose};
use crate::secrets::scrub;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    reasoning: String,
    is_health_related: bool,
}

pub struct Guardrail {
    model: ModelSpec,
}

impl Guardrail {
    pub fn new(model: ModelSpec) -> Self {
        Self { model }
    }

    /// True only when the model says the message is in scope.
    ///
    /// Blank input is rejected without a model call.
    pub async fn is_in_scope(&self, gateway: &dyn Gateway, message: &str) -> bool {
        if message.trim().is_empty() {
            return false;
        }

        let request =
            CompletionRequest::new(Purpose::Guardrail, &self.model, prompts::guardrail(message));

        match generate_json::<Verdict>(gateway, &request).await {
            Ok(verdict) => {
                tracing::debug!(
                    in_scope = verdict.is_health_related,
                    "Guardrail verdict: {}",
                    verdict.reasoning
                );
                verdict.is_health_related
            }
            Err(e) => {
                tracing::warn!("Guardrail failed closed: {}", scrub(&e.to_string()));
                false
            }
        }
    }
}
