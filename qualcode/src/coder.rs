//! The coding orchestrator.
//!
//! [`Coder::code`] validates its arguments, gates large inputs behind a
//! confirmation, opens one chat session, submits every row in a single batch
//! call and merges the structured results back into the table.
//!
//! # Example
//!
//! ```no_run
//! # use qualcode::prelude::*;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::object(vec![Field::new("favorite_fruits", Schema::string())]);
//!
//! let coded = Coder::new(OpenAiChat::new())
//!     .session(SessionConfig::default().with_system_prompt("Extract the fruits mentioned."))
//!     .code(vec!["I like bananas", "I prefer apples"], &schema, ColumnSelector::index(0))
//!     .await?;
//!
//! println!("{}", serde_json::to_string_pretty(&coded.to_records())?);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use qualcode_chat::{ChatConfig, ChatError, ExtractionConfig, Schema, StructuredChat};
use serde_json::{Map, Value};

use crate::config::{ModelConfig, SessionConfig, DEFAULT_CHAR_WARNING_THRESHOLD};
use crate::confirm::{Confirm, Confirmation, ConsoleConfirm};
use crate::credentials::{resolve_api_key, CredentialSource, EnvCredentials};
use crate::errors::CodingError;
use crate::table::{ColumnSelector, Input, Table};

/// Property holding a bare result that is not a JSON object.
pub const NON_OBJECT_KEY: &str = "value";

/// Result of a coding call.
#[derive(Debug, Clone, PartialEq)]
pub enum Coded {
    /// Input rows with the schema's fields appended.
    Table(Table),
    /// One structured result per input row.
    Results(Vec<Value>),
}

impl Coded {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Table(table) => table.len(),
            Self::Results(results) => results.len(),
        }
    }

    /// `true` when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows as JSON objects. A bare result that is not an object is kept
    /// under a single [`NON_OBJECT_KEY`] property.
    #[must_use]
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        match self {
            Self::Table(table) => table.to_records(),
            Self::Results(results) => results
                .iter()
                .map(|r| match r {
                    Value::Object(map) => map.clone(),
                    other => {
                        let mut map = Map::new();
                        map.insert(NON_OBJECT_KEY.to_string(), other.clone());
                        map
                    }
                })
                .collect(),
        }
    }
}

/// Codes text columns with a structured-chat client.
///
/// Holds configuration only; every call opens and drops its own session.
#[derive(Clone)]
pub struct Coder {
    chat: Arc<dyn StructuredChat>,
    credentials: Arc<dyn CredentialSource>,
    confirm: Arc<dyn Confirm>,
    model: ModelConfig,
    session: SessionConfig,
    include_source: bool,
    char_warning_threshold: usize,
}

impl Coder {
    /// A coder with default configuration, environment credentials and
    /// console confirmation.
    #[must_use]
    pub fn new(chat: impl StructuredChat + 'static) -> Self {
        Self {
            chat: Arc::new(chat),
            credentials: Arc::new(EnvCredentials),
            confirm: Arc::new(ConsoleConfirm),
            model: ModelConfig::default(),
            session: SessionConfig::default(),
            include_source: true,
            char_warning_threshold: DEFAULT_CHAR_WARNING_THRESHOLD,
        }
    }

    /// Sets the model configuration.
    #[must_use]
    pub fn model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    /// Sets the session configuration.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Whether results are appended to the input rows (default) or returned bare.
    #[must_use]
    pub const fn include_source(mut self, include: bool) -> Self {
        self.include_source = include;
        self
    }

    /// Character volume above which confirmation is required.
    #[must_use]
    pub const fn char_warning_threshold(mut self, threshold: usize) -> Self {
        self.char_warning_threshold = threshold;
        self
    }

    /// Where to look up the API key when none is configured.
    #[must_use]
    pub fn credentials(mut self, source: impl CredentialSource + 'static) -> Self {
        self.credentials = Arc::new(source);
        self
    }

    /// Who confirms large inputs.
    #[must_use]
    pub fn confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Arc::new(confirm);
        self
    }

    /// Codes `column` of `input` against `schema`.
    ///
    /// # Errors
    ///
    /// Argument problems ([`CodingError::SchemaType`],
    /// [`CodingError::ColumnNotFound`], [`CodingError::InvalidArgument`],
    /// [`CodingError::MissingCredential`], [`CodingError::AbortedByUser`])
    /// are reported before any request is made. Client failures surface as
    /// [`CodingError::SessionInit`] or [`CodingError::Extraction`]. No partial
    /// results are returned.
    pub async fn code(
        &self,
        input: impl Into<Input>,
        schema: &Schema,
        column: impl Into<ColumnSelector>,
    ) -> Result<Coded, CodingError> {
        let table = input.into().into_table();
        let column = column.into();

        schema
            .check()
            .map_err(|e| CodingError::SchemaType(e.to_string()))?;
        let fields: Vec<String> = schema
            .fields()
            .ok_or_else(|| {
                CodingError::SchemaType(format!(
                    "expected an object schema describing each row, got {}",
                    schema.kind()
                ))
            })?
            .iter()
            .map(|f| f.name.clone())
            .collect();
        let texts = table.texts(&column)?;
        if self.include_source {
            if let Some(clash) = fields.iter().find(|f| table.columns().contains(f)) {
                return Err(CodingError::InvalidArgument {
                    argument: "schema",
                    reason: format!("field '{clash}' collides with an input column"),
                });
            }
        }
        let api_key = resolve_api_key(self.model.api_key.as_ref(), self.credentials.as_ref())?;

        self.check_volume(&texts).await?;

        tracing::info!(
            event = "coding_started",
            rows = texts.len(),
            column = %column,
            model = %self.model.model,
            "coding_started"
        );

        let config = self.chat_config(api_key);
        let session = self
            .chat
            .open_session(&config)
            .await
            .map_err(CodingError::SessionInit)?;

        let expected = texts.len();
        let results = session
            .extract_batch(texts, schema)
            .await
            .map_err(CodingError::Extraction)?;
        if results.len() != expected {
            return Err(CodingError::Extraction(ChatError::CountMismatch {
                expected,
                actual: results.len(),
            }));
        }

        match session.cost() {
            Ok(cost) => tracing::info!(event = "cost_estimate", cost = %cost, "Estimated cost: {cost}"),
            Err(e) => tracing::info!(event = "cost_estimate", error = %e, "Estimated cost: unknown"),
        }

        if self.include_source {
            table.with_results(&fields, results).map(Coded::Table)
        } else {
            Ok(Coded::Results(results))
        }
    }

    /// Like [`Coder::code`], but gives up with [`CodingError::Aborted`] as
    /// soon as `cancel` completes.
    ///
    /// # Errors
    ///
    /// See [`Coder::code`].
    pub async fn code_until<F>(
        &self,
        input: impl Into<Input>,
        schema: &Schema,
        column: impl Into<ColumnSelector>,
        cancel: F,
    ) -> Result<Coded, CodingError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.code(input, schema, column) => result,
            () = cancel => {
                tracing::warn!(event = "coding_aborted", "coding_aborted");
                Err(CodingError::Aborted)
            }
        }
    }

    /// The prompt runs on a blocking thread so that a raced cancellation in
    /// [`Coder::code_until`] can win while it waits for an answer.
    async fn check_volume(&self, texts: &[String]) -> Result<(), CodingError> {
        let total_chars: usize = texts.iter().map(|t| t.chars().count()).sum();
        if total_chars <= self.char_warning_threshold {
            return Ok(());
        }

        let question = format!(
            "The input has {total_chars} characters across {} rows, above the warning threshold of {}. Proceed?",
            texts.len(),
            self.char_warning_threshold
        );
        let confirm = Arc::clone(&self.confirm);
        let answer = tokio::task::spawn_blocking(move || confirm.confirm(&question))
            .await
            .unwrap_or(Confirmation::Unavailable);
        match answer {
            Confirmation::Yes => {
                tracing::info!(event = "volume_confirmed", total_chars, "volume_confirmed");
                Ok(())
            }
            answer => {
                tracing::warn!(event = "volume_declined", total_chars, answer = ?answer, "volume_declined");
                Err(CodingError::AbortedByUser {
                    total_chars,
                    threshold: self.char_warning_threshold,
                })
            }
        }
    }

    fn chat_config(&self, api_key: secrecy::SecretString) -> ChatConfig {
        let mut config = ChatConfig::new(self.model.model.clone(), self.model.base_url.clone(), api_key)
            .with_echo(self.session.echo)
            .with_max_active(self.session.max_active);
        config.system_prompt.clone_from(&self.session.system_prompt);
        config.seed = self.model.seed;
        config.params.clone_from(&self.model.params);
        config.api_args.clone_from(&self.model.api_args);
        config.extraction = ExtractionConfig::default().with_max_attempts(self.session.max_attempts);
        config
    }
}
