//! Error types for chat sessions with per-row attempt history.

use std::time::Duration;
use thiserror::Error;

use crate::schema::SchemaError;
use crate::usage::TokenUsage;

/// Record of a single extraction attempt for one row.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// The attempt number (1-indexed).
    pub attempt_number: usize,
    /// The JSON the model produced, `Null` if it did not parse.
    pub submitted_json: serde_json::Value,
    /// Parse or validation error messages from this attempt.
    pub validation_errors: Vec<String>,
    /// Raw model output text.
    pub raw_output: String,
    /// Elapsed time at this attempt.
    pub elapsed: Duration,
}

/// Errors raised by the structured-chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The session could not be constructed.
    #[error("could not open chat session: {0}")]
    Init(String),

    /// The provider request for a row failed (network, auth, quota, ...).
    #[error("row {row}: provider request failed: {message}")]
    Provider {
        /// 0-based input row.
        row: usize,
        /// Provider error text.
        message: String,
    },

    /// Every attempt for a row produced unparseable or non-conforming output.
    #[error("row {row}: no schema-conforming response after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// 0-based input row.
        row: usize,
        /// Number of attempts made.
        attempts: usize,
        /// Summary of the final attempt's errors.
        last_error: String,
        /// History of all attempts.
        history: Vec<AttemptRecord>,
        /// Tokens spent on the failed row.
        usage: TokenUsage,
    },

    /// The batch returned a different number of results than it was given.
    #[error("expected {expected} results, got {actual}")]
    CountMismatch {
        /// Number of inputs.
        expected: usize,
        /// Number of results.
        actual: usize,
    },

    /// The schema could not be rendered or compiled.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The usage ledger could not be read.
    #[error("cost estimate unavailable: {0}")]
    Cost(String),
}
