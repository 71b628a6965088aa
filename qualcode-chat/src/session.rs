//! Structured-chat sessions.
//!
//! [`StructuredChat`] opens sessions; a [`ChatSession`] codes a whole batch
//! of texts against one [`Schema`] and keeps a usage ledger for cost
//! reporting. [`RigSession`] implements the session over any [`Completer`],
//! and [`RigCompleter`] adapts a rig [`CompletionModel`] into one.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use rig::completion::message::AssistantContent;
use rig::completion::{CompletionModel, Message};
use serde_json::{json, Map, Value};

use crate::config::{ChatConfig, EchoMode, ExtractionConfig};
use crate::error::ChatError;
use crate::extraction::{Completer, ExtractionLoop, RowCompletion, RowRequest};
use crate::schema::{Schema, SchemaError};
use crate::usage::{CostEstimate, TokenUsage};

/// Name given to the schema in `json_schema` response formats.
const RESPONSE_FORMAT_NAME: &str = "structured_output";

/// Opens chat sessions.
#[async_trait]
pub trait StructuredChat: Send + Sync {
    /// Opens one session bound to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Init`] when the session cannot be constructed.
    async fn open_session(&self, config: &ChatConfig) -> Result<Box<dyn ChatSession>, ChatError>;
}

/// A configured handle to an LLM endpoint.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Extracts one schema-conforming value per input, in input order.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any row fails; no partial results are returned.
    async fn extract_batch(&self, inputs: Vec<String>, schema: &Schema) -> Result<Vec<Value>, ChatError>;

    /// Usage so far and its estimated price.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Cost`] when the usage ledger is unavailable.
    fn cost(&self) -> Result<CostEstimate, ChatError>;
}

/// Session over a single-turn [`Completer`].
pub struct RigSession<C> {
    completer: C,
    model: String,
    system_prompt: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
    additional_params: Map<String, Value>,
    echo: EchoMode,
    max_active: usize,
    extraction: ExtractionConfig,
    usage: Mutex<TokenUsage>,
}

impl<C: Completer> RigSession<C> {
    /// Creates a session; the credential in `config` is not retained.
    #[must_use]
    pub fn new(completer: C, config: &ChatConfig) -> Self {
        Self {
            completer,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature(),
            max_tokens: config.max_tokens(),
            additional_params: config.additional_params(),
            echo: config.echo,
            max_active: config.max_active.max(1),
            extraction: config.extraction.clone(),
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Request body fields for one schema: the `json_schema` response format
    /// first, then the configured extras, with `null`s removed.
    fn request_params(&self, schema: &Value) -> Value {
        let mut params = Map::new();
        params.insert(
            "response_format".to_string(),
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": RESPONSE_FORMAT_NAME,
                    "schema": schema,
                    "strict": true,
                }
            }),
        );
        for (key, value) in &self.additional_params {
            params.insert(key.clone(), value.clone());
        }
        params.retain(|_, value| !value.is_null());
        Value::Object(params)
    }

    fn record(&self, usage: TokenUsage) {
        if let Ok(mut ledger) = self.usage.lock() {
            *ledger += usage;
        }
    }
}

#[async_trait]
impl<C: Completer> ChatSession for RigSession<C> {
    async fn extract_batch(&self, inputs: Vec<String>, schema: &Schema) -> Result<Vec<Value>, ChatError> {
        schema.check()?;
        let rendered = schema.to_json_schema();
        let validator = jsonschema::Validator::new(&rendered)
            .map_err(|e| SchemaError::Invalid(e.to_string()))?;
        let extraction = ExtractionLoop::new(&rendered, &validator, &self.extraction);
        let params = self.request_params(&rendered);
        let expected = inputs.len();

        tracing::debug!(
            event = "batch_started",
            rows = expected,
            max_active = self.max_active,
            model = %self.model,
            "batch_started"
        );

        let extraction = &extraction;
        let params = &params;
        let results: Vec<Value> = futures::stream::iter(inputs.into_iter().enumerate())
            .map(move |(row, text)| async move {
                if self.echo == EchoMode::All {
                    tracing::info!(target: "qualcode::echo", row, input = %text, "input");
                }
                let request = RowRequest {
                    preamble: self.system_prompt.clone(),
                    prompt: text,
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                    additional_params: Some(params.clone()),
                };
                let outcome = extraction.run(&self.completer, row, request).await;
                match &outcome {
                    Ok(ok) => self.record(ok.usage),
                    Err(ChatError::MaxRetriesExceeded { usage, .. }) => self.record(*usage),
                    Err(_) => {}
                }
                let outcome = outcome?;
                if self.echo != EchoMode::None {
                    tracing::info!(
                        target: "qualcode::echo",
                        row,
                        attempts = outcome.attempts,
                        output = %outcome.value,
                        "output"
                    );
                }
                Ok::<_, ChatError>(outcome.value)
            })
            .buffered(self.max_active)
            .try_collect()
            .await?;

        if results.len() != expected {
            return Err(ChatError::CountMismatch {
                expected,
                actual: results.len(),
            });
        }

        tracing::debug!(event = "batch_completed", rows = expected, "batch_completed");
        Ok(results)
    }

    fn cost(&self) -> Result<CostEstimate, ChatError> {
        let usage = *self
            .usage
            .lock()
            .map_err(|_| ChatError::Cost("usage ledger poisoned".to_string()))?;
        Ok(CostEstimate::new(self.model.clone(), usage))
    }
}

/// Adapts a rig [`CompletionModel`] into a [`Completer`].
#[derive(Clone)]
pub struct RigCompleter<M> {
    model: M,
}

impl<M> RigCompleter<M> {
    /// Wraps a rig completion model.
    #[must_use]
    pub const fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> Completer for RigCompleter<M>
where
    M: CompletionModel + 'static,
{
    async fn complete(&self, request: RowRequest) -> Result<RowCompletion, String> {
        let mut builder = self.model.completion_request(Message::user(request.prompt));
        if let Some(preamble) = request.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(params) = request.additional_params {
            builder = builder.additional_params(params);
        }

        let response = builder.send().await.map_err(|e| e.to_string())?;

        let text = response
            .choice
            .iter()
            .filter_map(|content| match content {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(RowCompletion {
            text,
            usage: TokenUsage::single(response.usage.input_tokens, response.usage.output_tokens),
        })
    }
}
