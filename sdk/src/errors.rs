//! Error types and handling
//!
//! This module provides the error types used throughout the PT engine.
//! All errors implement the `EngineErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages surfaced to API clients go through `user_hint`, which never
//! contains provider payloads, API keys or database internals.

use thiserror::Error;

/// Trait for engine error extensions
///
/// Provides additional context for errors, including user-friendly hints and
/// recoverability information.
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain secrets,
    /// raw provider responses or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried as-is (for example a failed save during
    /// `close`, where the in-memory session is kept intact).
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Identity / Session**: Unknown users, missing or mismatched sessions
/// - **LLM Provider**: Structured-output failures that propagate out of a component
/// - **Persistence**: Document store failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
///
/// let error = EngineError::UserNotFound("Ana:Lee".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let save_error = EngineError::Persistence("database is locked".to_string());
/// assert!(save_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Request validation errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid model identifier: {0}")]
    InvalidModel(String),

    // Identity and session errors
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No active session for {0}")]
    SessionNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::InvalidRequest(_) => "The request is missing required fields",
            Self::InvalidModel(_) => {
                "Use a model identifier such as 'openai:gpt-4o-mini' or 'gemini:gemini-1.5-flash'"
            }

            Self::UserNotFound(_) => "No conversation exists for this name",
            Self::SessionNotFound(_) => "Start a session with /init first",
            Self::Unauthorized(_) => "Credentials do not match an active session. Call /init first",

            Self::LLMProvider(_) => "The model is currently down. Please try again later",

            Self::Persistence(_) => "Saving the conversation failed. Try closing the session again",
            Self::Database(_) => "Database operation failed. Try restarting the server",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            Self::Network(_) => "Network operation failed. Check your connection",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::InvalidRequest(_)
            | Self::InvalidModel(_)
            | Self::UserNotFound(_)
            | Self::SessionNotFound(_)
            | Self::Unauthorized(_) => false,

            _ => true,
        }
    }
}
