//! Per-row validation loop for structured extraction.
//!
//! Each row is sent to a [`Completer`]; the answer is parsed, validated
//! against the compiled schema, and on failure the prompt is extended with
//! feedback and re-sent, up to [`ExtractionConfig::max_attempts`] times.

use async_trait::async_trait;
use jsonschema::Validator;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::ExtractionConfig;
use crate::error::{AttemptRecord, ChatError};
use crate::feedback::{build_parse_error_feedback, build_validation_feedback, collect_validation_errors};
use crate::usage::TokenUsage;

/// One completion request as the provider sees it.
#[derive(Debug, Clone, Default)]
pub struct RowRequest {
    /// System prompt.
    pub preamble: Option<String>,
    /// User turn.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion length cap.
    pub max_tokens: Option<u64>,
    /// Extra request body fields (`response_format`, `seed`, ...).
    pub additional_params: Option<Value>,
}

/// Text and usage returned by a provider.
#[derive(Debug, Clone, Default)]
pub struct RowCompletion {
    /// Assistant text.
    pub text: String,
    /// Provider-reported usage, empty if the provider reports none.
    pub usage: TokenUsage,
}

/// A single-turn completion backend.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Sends one request. The error string is the provider's message.
    async fn complete(&self, request: RowRequest) -> Result<RowCompletion, String>;
}

/// A validated result with the cost of producing it.
#[derive(Debug, Clone)]
pub struct RowOutcome {
    /// Schema-conforming value.
    pub value: Value,
    /// Attempts used (1-indexed).
    pub attempts: usize,
    /// Tokens spent across all attempts.
    pub usage: TokenUsage,
}

/// Bounded retry loop with validation feedback for one schema.
pub struct ExtractionLoop<'a> {
    schema: &'a Value,
    validator: &'a Validator,
    config: &'a ExtractionConfig,
}

impl<'a> ExtractionLoop<'a> {
    /// Creates a loop over a rendered schema and its compiled validator.
    #[must_use]
    pub const fn new(schema: &'a Value, validator: &'a Validator, config: &'a ExtractionConfig) -> Self {
        Self {
            schema,
            validator,
            config,
        }
    }

    /// Runs the loop for input row `row`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Provider`] as soon as the backend fails, and
    /// [`ChatError::MaxRetriesExceeded`] when every attempt was rejected.
    pub async fn run(
        &self,
        completer: &dyn Completer,
        row: usize,
        request: RowRequest,
    ) -> Result<RowOutcome, ChatError> {
        let start = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let schema_hint = self.config.include_schema_in_feedback.then_some(self.schema);
        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut request = request;

        for attempt in 1..=max_attempts {
            let completion = completer
                .complete(request.clone())
                .await
                .map_err(|message| ChatError::Provider { row, message })?;

            usage += if completion.usage.is_empty() {
                TokenUsage::estimated(&request.prompt, &completion.text)
            } else {
                completion.usage
            };

            let feedback = match parse_json_output(&completion.text) {
                Ok(parsed) => {
                    let errors = collect_validation_errors(self.validator, &parsed);
                    if errors.is_empty() {
                        return Ok(RowOutcome {
                            value: parsed,
                            attempts: attempt,
                            usage,
                        });
                    }
                    let feedback =
                        build_validation_feedback(schema_hint, &parsed, &errors, attempt, max_attempts);
                    history.push(AttemptRecord {
                        attempt_number: attempt,
                        submitted_json: parsed,
                        validation_errors: errors,
                        raw_output: completion.text,
                        elapsed: start.elapsed(),
                    });
                    feedback
                }
                Err(e) => {
                    let message = e.to_string();
                    let feedback = build_parse_error_feedback(
                        &completion.text,
                        &message,
                        attempt,
                        max_attempts,
                        schema_hint,
                    );
                    history.push(AttemptRecord {
                        attempt_number: attempt,
                        submitted_json: Value::Null,
                        validation_errors: vec![format!("JSON parse error: {message}")],
                        raw_output: completion.text,
                        elapsed: start.elapsed(),
                    });
                    feedback
                }
            };

            if attempt < max_attempts {
                tracing::debug!(
                    event = "row_retry",
                    row,
                    attempt,
                    max_attempts,
                    "row_retry"
                );
                request.prompt = format!("{}\n\n{feedback}", request.prompt);
            }
        }

        let last_error = history
            .last()
            .map(|record| record.validation_errors.join("; "))
            .unwrap_or_default();

        Err(ChatError::MaxRetriesExceeded {
            row,
            attempts: max_attempts,
            last_error,
            history,
            usage,
        })
    }
}

/// Parses model output as JSON, tolerating a fenced code block or prose
/// around a single object.
///
/// # Errors
///
/// Returns the error from parsing the trimmed text when no candidate parses.
pub fn parse_json_output(text: &str) -> Result<Value, serde_json::Error> {
    let trimmed = text.trim();
    let first_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(fenced) = strip_code_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            return Ok(value);
        }
    }

    if let (Some(open), Some(close)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if open < close {
            if let Ok(value) = serde_json::from_str::<Value>(&trimmed[open..=close]) {
                return Ok(value);
            }
        }
    }

    Err(first_error)
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let body = text.strip_prefix("```")?;
    let body = body.strip_suffix("```")?;
    let body = body.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    Some(body.trim())
}
