//! Fact Extractor
//!
//! The model reports only what changed. The diff is merged into the current
//! table so facts it did not mention stay byte-identical, and an empty diff
//! is a no-op rather than a wipe.

use super::prompts;
use super::window::ConversationTurn;
use crate::config::FactFailurePolicy;
use crate::llm::{generate_json, CompletionRequest, Gateway, ModelSpec, Purpose};
use crate::secrets::scrub;
use sdk::FactTable;

pub struct FactExtractor {
    model: ModelSpec,
    policy: FactFailurePolicy,
    enabled: bool,
}

impl FactExtractor {
    pub fn new(model: ModelSpec, policy: FactFailurePolicy, enabled: bool) -> Self {
        Self {
            model,
            policy,
            enabled,
        }
    }

    /// New table after merging the model's diff into `current`.
    ///
    /// Never fails: on a gateway or parse error the configured policy decides
    /// between an empty table and `current`.
    pub async fn update(
        &self,
        gateway: &dyn Gateway,
        current: &FactTable,
        summary: &str,
        recent: &[ConversationTurn],
    ) -> FactTable {
        if !self.enabled {
            return current.clone();
        }

        let request = CompletionRequest::new(
            Purpose::Facts,
            &self.model,
            prompts::facts(current, summary, recent),
        );

        // Non-string values fail deserialization and go through the repair path
        match generate_json::<FactTable>(gateway, &request).await {
            Ok(diff) => merge(current, diff),
            Err(e) => {
                tracing::warn!(
                    policy = ?self.policy,
                    "Fact extraction failed: {}",
                    scrub(&e.to_string())
                );
                match self.policy {
                    FactFailurePolicy::Reset => FactTable::new(),
                    FactFailurePolicy::Preserve => current.clone(),
                }
            }
        }
    }
}

/// Apply a diff; a blank value deletes its key
pub fn merge(current: &FactTable, diff: FactTable) -> FactTable {
    let mut merged = current.clone();
    for (key, value) in diff {
        let key = key.trim().to_string();
        if key.is_empty() {
            continue;
        }
        if value.trim().is_empty() {
            merged.remove(&key);
        } else {
            merged.insert(key, value);
        }
    }
    merged
}
