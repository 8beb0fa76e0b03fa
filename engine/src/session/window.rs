//! Conversation Window
//!
//! Ordered human/assistant turns for one session. Nothing is evicted while the
//! session is live; the cap is applied only when the window is split into the
//! persisted `messages` / `responses` lists.

use crate::llm::Message;
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Assistant,
}

/// One immutable turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationTurn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Human,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }

    /// Provider message for this turn
    pub fn to_message(&self) -> Message {
        match self.speaker {
            Speaker::Human => Message::user(self.text.clone()),
            Speaker::Assistant => Message::assistant(self.text.clone()),
        }
    }
}

/// A message and the reply it got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub message: String,
    pub response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationWindow {
    turns: Vec<ConversationTurn>,
}

impl ConversationWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted lists.
    ///
    /// `messages[i]` pairs with `responses[i]` counting from the most recent
    /// end, so lists of unequal length keep their newest `min(len)` pairs.
    pub fn from_lists(messages: &[String], responses: &[String]) -> Self {
        let pairs = messages.len().min(responses.len());
        let messages = &messages[messages.len() - pairs..];
        let responses = &responses[responses.len() - pairs..];

        let turns = messages
            .iter()
            .zip(responses)
            .flat_map(|(m, r)| [ConversationTurn::human(m), ConversationTurn::assistant(r)])
            .collect();

        Self { turns }
    }

    /// Append a completed exchange, human first
    pub fn push_exchange(&mut self, message: impl Into<String>, response: impl Into<String>) {
        self.turns.push(ConversationTurn::human(message));
        self.turns.push(ConversationTurn::assistant(response));
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `k` turns, oldest first
    pub fn recent(&self, k: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(k);
        &self.turns[start..]
    }

    /// The last `k` turns as provider messages
    pub fn recent_messages(&self, k: usize) -> Vec<Message> {
        self.recent(k)
            .iter()
            .map(ConversationTurn::to_message)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Split by role, trim each turn and keep the newest `cap` of each list
    pub fn split_by_role(&self, cap: usize) -> (Vec<String>, Vec<String>) {
        let mut messages = Vec::new();
        let mut responses = Vec::new();
        for turn in &self.turns {
            let text = turn.text.trim().to_string();
            match turn.speaker {
                Speaker::Human => messages.push(text),
                Speaker::Assistant => responses.push(text),
            }
        }

        (keep_last(messages, cap), keep_last(responses, cap))
    }

    /// The newest `limit` completed exchanges, oldest first
    pub fn exchanges(&self, limit: usize) -> Vec<Exchange> {
        let all: Vec<Exchange> = self
            .turns
            .windows(2)
            .filter(|pair| pair[0].speaker == Speaker::Human && pair[1].speaker == Speaker::Assistant)
            .map(|pair| Exchange {
                message: pair[0].text.clone(),
                response: pair[1].text.clone(),
            })
            .collect();

        keep_last(all, limit)
    }
}

fn keep_last<T>(mut items: Vec<T>, cap: usize) -> Vec<T> {
    if items.len() > cap {
        items.drain(..items.len() - cap);
    }
    items
}
