//! Conversation state machine
//!
//! A `Session` owns one user's window, summary, facts and meal plan. The
//! `Coach` holds the components every session shares, and the
//! `SessionRegistry` keeps at most one live session per identity.

pub mod facts;
pub mod guardrail;
pub mod meal_plan;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod summary;
pub mod window;

#[cfg(test)]
pub(crate) mod stub;

pub use orchestrator::{ChatReply, Coach, History, Session, TurnOutcome, TurnState};
pub use registry::{InitReply, SessionRegistry};
pub use window::{ConversationTurn, ConversationWindow, Exchange, Speaker};
