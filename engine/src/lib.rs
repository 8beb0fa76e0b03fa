//! PT Engine Library
//!
//! Core of the PT coaching assistant: the per-user session state machine,
//! the model gateway and the stores it depends on. Used by the `pt` binary
//! and by integration tests.

/// HTTP API
pub mod api;

/// CLI interface module
pub mod cli;

/// Configuration management module
pub mod config;

/// Snapshot persistence module
pub mod db;

/// Command handlers module
pub mod handlers;

/// LLM provider abstraction layer
pub mod llm;

/// Secret management module
pub mod secrets;

/// Conversation sessions and their update pipeline
pub mod session;

/// Telemetry and Observability
pub mod telemetry;
