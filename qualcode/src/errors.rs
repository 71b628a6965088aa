//! Public error types for qualcode.

use qualcode_chat::ChatError;
use thiserror::Error;

/// Errors that can abort a coding call.
///
/// Argument errors are raised before any network activity. Session and
/// extraction errors wrap the chat client's error with its message intact.
#[derive(Debug, Error)]
pub enum CodingError {
    /// No API key was passed and none is set in the environment.
    #[error("No API key: pass one in ModelConfig or set {key}")]
    MissingCredential {
        /// Environment key that was consulted.
        key: String,
    },

    /// The schema cannot describe a per-row structured result.
    #[error("Invalid schema: {0}")]
    SchemaType(String),

    /// A caller-supplied argument is malformed.
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        argument: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The text column does not exist in the input table.
    #[error("Column {column} not found (available: {})", available.join(", "))]
    ColumnNotFound {
        /// The selector as given.
        column: String,
        /// Columns the table does have.
        available: Vec<String>,
    },

    /// The input exceeded the size threshold and was not confirmed.
    #[error(
        "Aborted: input has {total_chars} characters (threshold {threshold}) and was not confirmed"
    )]
    AbortedByUser {
        /// Total characters across all texts.
        total_chars: usize,
        /// Configured threshold.
        threshold: usize,
    },

    /// The caller cancelled the call while it was running.
    #[error("Aborted: the call was interrupted")]
    Aborted,

    /// The chat client could not open a session.
    #[error("Session initialization failed: {0}")]
    SessionInit(#[source] ChatError),

    /// The batch extraction failed.
    #[error("Extraction failed: {0}")]
    Extraction(#[source] ChatError),
}

impl CodingError {
    /// `true` for deliberate cancellations (declined confirmation or
    /// interruption) as opposed to failures.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::AbortedByUser { .. } | Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_argument() {
        let err = CodingError::ColumnNotFound {
            column: "'answer'".to_string(),
            available: vec!["id".to_string(), "text".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Column 'answer' not found (available: id, text)"
        );

        let err = CodingError::InvalidArgument {
            argument: "column",
            reason: "exactly one column must be selected".to_string(),
        };
        assert!(err.to_string().contains("`column`"));
    }

    #[test]
    fn test_extraction_keeps_client_message() {
        let err = CodingError::Extraction(ChatError::Provider {
            row: 3,
            message: "insufficient_quota".to_string(),
        });
        assert!(err.to_string().contains("row 3"));
        assert!(err.to_string().contains("insufficient_quota"));
        assert!(!err.is_cancellation());
        assert!(CodingError::Aborted.is_cancellation());
    }
}
