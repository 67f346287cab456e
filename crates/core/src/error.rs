//! Error types for the Turnstile domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; only setup and store
//! failures ever reach the caller as a Rust `Err`. Everything that happens
//! once the loop is running is reported in-band through the chunk stream.

use thiserror::Error;

use crate::message::{ProjectId, ThreadId};

/// The top-level error type for all Turnstile operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Session setup errors ---
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    // --- Session store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Fatal errors raised before the first iteration. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("Session not found: {0}")]
    SessionNotFound(ThreadId),

    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("No compute environment found for project {0}")]
    MissingComputeEnvironment(ProjectId),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// The environment observation could not be turned into a context message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnrichError {
    #[error("Malformed observation: {0}")]
    MalformedObservation(String),
}

/// An assistant chunk whose content is not a decodable object.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Undecodable chunk content: {0}")]
    UndecodableChunkContent(String),
}

/// The admission backend could not be consulted.
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("Admission backend unavailable: {0}")]
    Unavailable(String),
}
