//! Conversation snapshot types shared between the engine and its collaborators

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::EngineError;

/// Durable facts about a user, string keys to string values.
///
/// A `BTreeMap` keeps prompt rendering and persistence deterministic.
pub type FactTable = BTreeMap<String, String>;

/// Identity of a user. Authentication is the name pair only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub first_name: String,
    pub last_name: String,
}

impl UserIdentity {
    /// Build an identity, trimming whitespace and rejecting empty names
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let first_name = first_name.into().trim().to_string();
        let last_name = last_name.into().trim().to_string();

        if first_name.is_empty() || last_name.is_empty() {
            return Err(EngineError::InvalidRequest(
                "first_name and last_name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            first_name,
            last_name,
        })
    }

    /// Pool key, `"first_name:last_name"`
    pub fn key(&self) -> String {
        format!("{}:{}", self.first_name, self.last_name)
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

/// At-rest projection of one user's conversation state.
///
/// `messages[i]` and `responses[i]` are the i-th human turn and the assistant
/// turn that answered it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub messages: Vec<String>,

    #[serde(default)]
    pub responses: Vec<String>,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub key_facts: FactTable,

    #[serde(default)]
    pub meal_plan: String,
}

impl SessionSnapshot {
    /// True when there is no dialogue to persist
    pub fn has_no_dialogue(&self) -> bool {
        self.messages.is_empty() && self.responses.is_empty()
    }
}

/// Result of a save attempt, `(success, message)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub success: bool,
    pub message: String,
}

impl SaveReport {
    pub fn saved() -> Self {
        Self {
            success: true,
            message: "User data saved".to_string(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
