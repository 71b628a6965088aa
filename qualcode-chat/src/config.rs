//! Session and extraction configuration.

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// How much per-request traffic a session surfaces while a batch runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoMode {
    /// Nothing.
    #[default]
    None,
    /// Each structured result as it arrives.
    Output,
    /// Each input text and each structured result.
    All,
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Output => "output",
            Self::All => "all",
        })
    }
}

impl FromStr for EchoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "output" => Ok(Self::Output),
            "all" => Ok(Self::All),
            other => Err(format!("unknown echo mode '{other}' (expected none, output or all)")),
        }
    }
}

/// Configuration for the per-row validation loop.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Maximum number of attempts per row before giving up (default: 3).
    pub max_attempts: usize,
    /// Whether to include the full schema in validation feedback (default: true).
    pub include_schema_in_feedback: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            include_schema_in_feedback: true,
        }
    }
}

impl ExtractionConfig {
    /// Set the maximum number of attempts per row.
    #[must_use]
    pub const fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set whether to include the schema in validation feedback.
    #[must_use]
    pub const fn with_schema_in_feedback(mut self, include: bool) -> Self {
        self.include_schema_in_feedback = include;
        self
    }
}

/// Everything needed to open one chat session.
///
/// The API key is held as a [`SecretString`]; its `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// Resolved credential.
    pub api_key: SecretString,
    /// System prompt applied to every request of the session.
    pub system_prompt: Option<String>,
    /// Sampling seed for providers that support reproducible output.
    pub seed: Option<i64>,
    /// Generation parameters (`temperature`, `max_tokens`, `top_p`, ...).
    pub params: Map<String, Value>,
    /// Provider-specific request fields, merged last into every request.
    /// A `null` value removes a key set by the session.
    pub api_args: Map<String, Value>,
    /// Progress surfacing.
    pub echo: EchoMode,
    /// Maximum number of rows in flight at once (default: 10).
    pub max_active: usize,
    /// Per-row validation loop settings.
    pub extraction: ExtractionConfig,
}

impl ChatConfig {
    /// Creates a configuration for the given endpoint with default settings.
    #[must_use]
    pub fn new(model: impl Into<String>, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            system_prompt: None,
            seed: None,
            params: Map::new(),
            api_args: Map::new(),
            echo: EchoMode::None,
            max_active: 10,
            extraction: ExtractionConfig::default(),
        }
    }

    /// Sets the session system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the echo mode.
    #[must_use]
    pub const fn with_echo(mut self, echo: EchoMode) -> Self {
        self.echo = echo;
        self
    }

    /// Sets the concurrency bound.
    #[must_use]
    pub const fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Reads `temperature` from the generation parameters.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.params.get("temperature").and_then(Value::as_f64)
    }

    /// Reads `max_tokens` from the generation parameters.
    #[must_use]
    pub fn max_tokens(&self) -> Option<u64> {
        self.params.get("max_tokens").and_then(Value::as_u64)
    }

    /// Provider request fields other than temperature and `max_tokens`:
    /// the remaining generation parameters, the seed, then `api_args`.
    #[must_use]
    pub fn additional_params(&self) -> Map<String, Value> {
        let mut out: Map<String, Value> = self
            .params
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "temperature" | "max_tokens"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if let Some(seed) = self.seed {
            out.insert("seed".to_string(), Value::from(seed));
        }
        for (key, value) in &self.api_args {
            out.insert(key.clone(), value.clone());
        }
        out
    }
}
