//! Session Orchestrator
//!
//! Sequences the guardrail, answer, meal-plan and compaction steps for each
//! message, and the final compaction plus snapshot write at close.
//!
//! Per-message states:
//!
//! ```text
//! Idle -> Guardrailing -> Rejected -> Idle
//!                      -> Answering -> PlanCheck -> PlanRevise? -> Compacting -> Idle
//! ```
//!
//! A rejected or degraded turn leaves the window, summary, facts and meal
//! plan exactly as they were.

use super::facts::FactExtractor;
use super::guardrail::Guardrail;
use super::meal_plan::{MealPlanController, PlanContext};
use super::prompts;
use super::summary::SummaryCompactor;
use super::window::{ConversationWindow, Exchange};
use crate::config::{AnswerStrategy, Config, SessionConfig};
use crate::db::SnapshotStore;
use crate::llm::scorer::BestResponseScorer;
use crate::llm::{
    generate_answer, CompletionRequest, Gateway, Generated, ModelSpec, Purpose,
};
use sdk::{EngineError, FactTable, SaveReport, SessionSnapshot, UserIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

const FEEDBACK_ACK: &str = "Thank you for your feedback!";
const NO_USER_DATA: &str = "No user data to save";

/// Where a session is inside one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Guardrailing,
    Rejected,
    Answering,
    PlanCheck,
    PlanRevise,
    Compacting,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a chat message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    Rejected,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub meal_plan: String,
    pub outcome: TurnOutcome,
    pub plan_revised: bool,
}

/// Recent exchanges plus the running summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub history: Vec<Exchange>,
    pub summary: String,
}

impl History {
    pub fn from_snapshot(snapshot: &SessionSnapshot, limit: usize) -> Self {
        let window = ConversationWindow::from_lists(&snapshot.messages, &snapshot.responses);
        Self {
            history: window.exchanges(limit),
            summary: snapshot.summary.clone(),
        }
    }
}

enum Responder {
    Single,
    BestOf(BestResponseScorer),
}

/// Shared, stateless half of every session: the gateway and the configured components
pub struct Coach {
    gateway: Arc<dyn Gateway>,
    guardrail: Guardrail,
    summary: SummaryCompactor,
    facts: FactExtractor,
    meal_plan: MealPlanController,
    responder: Responder,
    default_model: ModelSpec,
    settings: SessionConfig,
}

fn model(field: &str, value: &str) -> Result<ModelSpec, EngineError> {
    value
        .parse()
        .map_err(|e| EngineError::Config(format!("Invalid model id in {}: {}", field, e)))
}

impl Coach {
    pub fn from_config(config: &Config, gateway: Arc<dyn Gateway>) -> Result<Self, EngineError> {
        let utility = model("llm.utility_model", &config.llm.utility_model)?;
        let session = config.session.clone();

        let responder = match config.answer.strategy {
            AnswerStrategy::Single => Responder::Single,
            AnswerStrategy::BestOf => Responder::BestOf(BestResponseScorer::new(
                config
                    .answer
                    .candidates
                    .iter()
                    .map(|c| model("answer.candidates", c))
                    .collect::<Result<_, _>>()?,
                model("answer.evaluator", &config.answer.evaluator)?,
                config.answer.max_workers,
            )),
        };

        Ok(Self {
            gateway,
            guardrail: Guardrail::new(model("llm.guardrail_model", &config.llm.guardrail_model)?),
            summary: SummaryCompactor::new(utility.clone(), session.summary_context_turns),
            facts: FactExtractor::new(
                utility.clone(),
                session.fact_failure_policy,
                session.extract_facts,
            ),
            meal_plan: MealPlanController::new(utility),
            responder,
            default_model: model("llm.default_model", &config.llm.default_model)?,
            settings: session,
        })
    }

    pub fn settings(&self) -> &SessionConfig {
        &self.settings
    }

    fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }

    /// A model named by the request always wins over the configured strategy
    async fn respond(
        &self,
        requested: Option<&ModelSpec>,
        context: &[crate::llm::Message],
        instruction: String,
    ) -> Generated {
        match (&self.responder, requested) {
            (Responder::BestOf(scorer), None) => {
                scorer
                    .answer(
                        &self.gateway,
                        Some(prompts::COACH_PERSONA),
                        context,
                        &instruction,
                    )
                    .await
            }
            (_, requested) => {
                let model = requested.unwrap_or(&self.default_model);
                let request = CompletionRequest::new(Purpose::Answer, model, instruction)
                    .with_system(prompts::COACH_PERSONA)
                    .with_context(context);
                generate_answer(self.gateway(), &request).await
            }
        }
    }
}

/// One user's live conversation
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    identity: UserIdentity,
    window: ConversationWindow,
    summary: String,
    facts: FactTable,
    meal_plan: String,
    state: TurnState,
}

impl Session {
    pub fn from_snapshot(identity: UserIdentity, snapshot: SessionSnapshot) -> Self {
        let window = ConversationWindow::from_lists(&snapshot.messages, &snapshot.responses);
        let session = Self {
            id: Uuid::new_v4(),
            identity,
            window,
            summary: snapshot.summary,
            facts: snapshot.key_facts,
            meal_plan: snapshot.meal_plan,
            state: TurnState::Idle,
        };
        tracing::info!(
            session = %session.id,
            user = %session.identity,
            turns = session.window.len(),
            "Session opened"
        );
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn window(&self) -> &ConversationWindow {
        &self.window
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn facts(&self) -> &FactTable {
        &self.facts
    }

    pub fn meal_plan(&self) -> &str {
        &self.meal_plan
    }

    fn enter(&mut self, next: TurnState) {
        tracing::debug!(session = %self.id, "{} -> {}", self.state, next);
        self.state = next;
    }

    /// Handle one inbound message
    pub async fn chat(
        &mut self,
        coach: &Coach,
        message: &str,
        model: Option<&ModelSpec>,
    ) -> ChatReply {
        if self.state != TurnState::Idle {
            tracing::warn!(session = %self.id, "Previous turn abandoned in {}", self.state);
        }
        self.enter(TurnState::Guardrailing);
        if !coach.guardrail.is_in_scope(coach.gateway(), message).await {
            self.enter(TurnState::Rejected);
            self.enter(TurnState::Idle);
            return ChatReply {
                response: prompts::REFUSAL.to_string(),
                meal_plan: self.meal_plan.clone(),
                outcome: TurnOutcome::Rejected,
                plan_revised: false,
            };
        }

        self.enter(TurnState::Answering);
        // The pending message travels in the instruction turn, not the context.
        // The window only changes once the exchange is complete, so a turn
        // dropped at any await leaves it paired.
        let context = self
            .window
            .recent_messages(coach.settings.answer_context_turns);

        let instruction = prompts::answer(&self.facts, &self.summary, &self.meal_plan, message);
        let answer = match coach.respond(model, &context, instruction).await {
            Generated::Text(text) => text,
            Generated::Degraded => {
                self.enter(TurnState::Idle);
                return ChatReply {
                    response: Generated::Degraded.reply().to_string(),
                    meal_plan: self.meal_plan.clone(),
                    outcome: TurnOutcome::Degraded,
                    plan_revised: false,
                };
            }
        };

        self.enter(TurnState::PlanCheck);
        let needs_change = {
            let ctx = self.plan_context(message, &answer);
            coach.meal_plan.needs_change(coach.gateway(), &ctx).await
        };
        let mut plan_revised = false;
        if needs_change {
            self.enter(TurnState::PlanRevise);
            let revised = {
                let ctx = self.plan_context(message, &answer);
                coach.meal_plan.revise(coach.gateway(), &ctx).await
            };
            if let Some(plan) = revised {
                self.meal_plan = plan;
                plan_revised = true;
            }
        }

        self.window.push_exchange(message, answer.clone());

        self.enter(TurnState::Compacting);
        self.compact(coach).await;

        self.enter(TurnState::Idle);
        ChatReply {
            response: answer,
            meal_plan: self.meal_plan.clone(),
            outcome: TurnOutcome::Answered,
            plan_revised,
        }
    }

    fn plan_context<'a>(&'a self, last_user: &'a str, last_assistant: &'a str) -> PlanContext<'a> {
        PlanContext {
            meal_plan: &self.meal_plan,
            facts: &self.facts,
            summary: &self.summary,
            last_user,
            last_assistant,
        }
    }

    /// Summary first, then facts (which read the new summary)
    async fn compact(&mut self, coach: &Coach) {
        let recent = self.window.recent(coach.summary.context_turns());
        self.summary = coach
            .summary
            .update(coach.gateway(), &self.summary, &self.facts, recent)
            .await;
        self.facts = coach
            .facts
            .update(coach.gateway(), &self.facts, &self.summary, recent)
            .await;
    }

    /// Durable projection with each role list capped at `cap`
    pub fn snapshot(&self, cap: usize) -> SessionSnapshot {
        let (messages, responses) = self.window.split_by_role(cap);
        SessionSnapshot {
            messages,
            responses,
            summary: self.summary.clone(),
            key_facts: self.facts.clone(),
            meal_plan: self.meal_plan.clone(),
        }
    }

    /// Final compaction and snapshot write.
    ///
    /// An empty window writes nothing. On a store error the session is left
    /// as it was so the close can be retried.
    pub async fn close(
        &mut self,
        coach: &Coach,
        store: &dyn SnapshotStore,
    ) -> Result<SaveReport, EngineError> {
        if self.window.is_empty() {
            tracing::info!(session = %self.id, "Nothing to save");
            return Ok(SaveReport::rejected(NO_USER_DATA));
        }

        self.enter(TurnState::Compacting);
        self.compact(coach).await;
        self.enter(TurnState::Idle);

        let snapshot = self.snapshot(coach.settings.persisted_turns_per_role);
        match store.save_user(&self.identity, &snapshot).await {
            Ok(report) => {
                tracing::info!(
                    session = %self.id,
                    user = %self.identity,
                    success = report.success,
                    "Session closed: {}",
                    report.message
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(session = %self.id, user = %self.identity, "Save failed: {}", e);
                Err(EngineError::Persistence(e.to_string()))
            }
        }
    }

    /// Record UI feedback as an exchange in the window
    pub fn record_feedback(&mut self, feedback: &serde_json::Value) {
        self.window
            .push_exchange(format!("Feedback: {}", feedback), FEEDBACK_ACK);
    }

    pub fn history(&self, limit: usize) -> History {
        History {
            history: self.window.exchanges(limit),
            summary: self.summary.clone(),
        }
    }
}
