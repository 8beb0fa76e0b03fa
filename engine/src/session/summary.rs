//! Summary Compactor

use super::prompts;
use super::window::ConversationTurn;
use crate::llm::{generate_text, CompletionRequest, Gateway, ModelSpec, Purpose};
use crate::secrets::scrub;
use sdk::FactTable;

/// Keeps one running digest of the conversation, revised after every turn
pub struct SummaryCompactor {
    model: ModelSpec,
    context_turns: usize,
}

impl SummaryCompactor {
    pub fn new(model: ModelSpec, context_turns: usize) -> Self {
        Self {
            model,
            context_turns,
        }
    }

    /// How many window turns the compactor reads
    pub fn context_turns(&self) -> usize {
        self.context_turns
    }

    /// Revise `current` with the latest turns. A failed call keeps `current`.
    pub async fn update(
        &self,
        gateway: &dyn Gateway,
        current: &str,
        facts: &FactTable,
        recent: &[ConversationTurn],
    ) -> String {
        let request = CompletionRequest::new(
            Purpose::Summary,
            &self.model,
            prompts::summary(current, facts, recent),
        );

        match generate_text(gateway, &request).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                tracing::warn!("Summary update failed, keeping previous: {}", scrub(&e.to_string()));
                current.to_string()
            }
        }
    }
}
