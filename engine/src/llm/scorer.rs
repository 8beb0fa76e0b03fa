//! Best-of-N answer selection
//!
//! The answer prompt goes to every candidate model through a bounded pool of
//! tasks.
//! Failed or blank candidates drop out; an evaluator model then picks the best
//! survivor by number. A pick that cannot be used falls back to the first
//! survivor, so the evaluator can only improve on the single-model answer.

use super::gateway::{CompletionRequest, Gateway, Generated, Purpose};
use super::{LLMError, Message, ModelSpec};
use crate::secrets::scrub;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct BestResponseScorer {
    candidates: Vec<ModelSpec>,
    evaluator: ModelSpec,
    max_workers: usize,
}

impl BestResponseScorer {
    pub fn new(candidates: Vec<ModelSpec>, evaluator: ModelSpec, max_workers: usize) -> Self {
        Self {
            candidates,
            evaluator,
            max_workers: max_workers.max(1),
        }
    }

    /// Produce the answer for one turn
    pub async fn answer(
        &self,
        gateway: &Arc<dyn Gateway>,
        system: Option<&str>,
        context: &[Message],
        instruction: &str,
    ) -> Generated {
        let survivors = self.collect(gateway, system, context, instruction).await;

        match survivors.len() {
            0 => {
                tracing::warn!("Every candidate model failed; answer degraded");
                Generated::Degraded
            }
            1 => Generated::from_answer(survivors[0].1.clone()),
            _ => {
                let pick = self
                    .evaluate(gateway.as_ref(), instruction, &survivors)
                    .await;
                let (model, text) = &survivors[pick];
                tracing::debug!(candidate = %model, "Evaluator picked response {}", pick + 1);
                Generated::from_answer(text.clone())
            }
        }
    }

    /// Ask every candidate, keeping successful non-blank replies in candidate order.
    ///
    /// Each branch is its own task holding owned copies of the prompt; at most
    /// `max_workers` of them are inside a model call at once. Dropping the
    /// returned future aborts the branches still running.
    async fn collect(
        &self,
        gateway: &Arc<dyn Gateway>,
        system: Option<&str>,
        context: &[Message],
        instruction: &str,
    ) -> Vec<(ModelSpec, String)> {
        let context: Arc<[Message]> = context.into();
        let instruction: Arc<str> = instruction.into();
        let system: Option<Arc<str>> = system.map(Arc::from);
        let permits = Arc::new(Semaphore::new(self.max_workers));

        let mut branches = JoinSet::new();
        for (index, model) in self.candidates.iter().cloned().enumerate() {
            let gateway = Arc::clone(gateway);
            let context = Arc::clone(&context);
            let instruction = Arc::clone(&instruction);
            let system = system.clone();
            let permits = Arc::clone(&permits);

            branches.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        let mut request =
                            CompletionRequest::new(Purpose::Answer, &model, instruction.as_ref())
                                .with_context(&context[..]);
                        request.system = system.as_deref();
                        gateway.complete(&request).await
                    }
                    Err(e) => Err(LLMError::Unknown(format!("worker pool closed: {}", e))),
                };
                (index, model, result)
            });
        }

        let mut results = Vec::with_capacity(self.candidates.len());
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(branch) => results.push(branch),
                Err(e) => tracing::warn!("Candidate task did not finish: {}", e),
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        results
            .into_iter()
            .filter_map(|(_, model, result)| match result {
                Ok(text) if !text.trim().is_empty() => Some((model, text)),
                Ok(_) => {
                    tracing::debug!(candidate = %model, "Candidate returned blank text");
                    None
                }
                Err(e) => {
                    tracing::warn!(candidate = %model, "Candidate failed: {}", scrub(&e.to_string()));
                    None
                }
            })
            .collect()
    }

    /// Index into `survivors` of the evaluator's choice
    async fn evaluate(
        &self,
        gateway: &dyn Gateway,
        instruction: &str,
        survivors: &[(ModelSpec, String)],
    ) -> usize {
        let mut prompt = format!(
            "{}\n\nAssume the role of a health coach and pick the best of these {} responses:\n",
            instruction,
            survivors.len()
        );
        for (i, (_, text)) in survivors.iter().enumerate() {
            prompt.push_str(&format!("{}:\n{}\n\n", i + 1, text.trim()));
        }
        prompt.push_str(
            "Please output ONLY the number of the best response, and nothing else. \
             No explanation, no quotes, no labels. Just a single number.",
        );

        let request = CompletionRequest::new(Purpose::Evaluate, &self.evaluator, prompt);
        match gateway.complete(&request).await {
            Ok(text) => match parse_pick(&text, survivors.len()) {
                Some(index) => index,
                None => {
                    tracing::warn!("Evaluator pick unusable ({:?}); using first response", text.trim());
                    0
                }
            },
            Err(e) => {
                tracing::warn!("Evaluator failed: {}; using first response", scrub(&e.to_string()));
                0
            }
        }
    }
}

/// First integer in the text, as a zero-based index when in `1..=count`
fn parse_pick(text: &str, count: usize) -> Option<usize> {
    let digits: String = text
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let number: usize = digits.parse().ok()?;
    (1..=count).contains(&number).then_some(number - 1)
}
