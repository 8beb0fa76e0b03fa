//! PT SDK
//!
//! Shared library providing the error taxonomy and the conversation snapshot
//! types used by the engine, its store and its HTTP surface.

/// Error types and handling
pub mod errors;

/// Identity and snapshot types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use types::{FactTable, SaveReport, SessionSnapshot, UserIdentity};
