//! Model and session configuration for coding calls.

use qualcode_chat::{EchoMode, DEFAULT_BASE_URL, DEFAULT_MODEL};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default character volume above which a call needs confirmation.
pub const DEFAULT_CHAR_WARNING_THRESHOLD: usize = 100_000;

/// Which model to call and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Endpoint base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Credential; `None` falls back to the credential source.
    #[serde(default, with = "secret_string_serde", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,
    /// Sampling seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Generation parameters, e.g. `temperature`.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Provider-specific request fields, passed through.
    #[serde(default)]
    pub api_args: Map<String, Value>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            seed: None,
            params: Map::new(),
            api_args: Map::new(),
        }
    }
}

impl ModelConfig {
    /// Configuration for `model` at the default endpoint.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets an explicit credential.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Sets the seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(self, temperature: f64) -> Self {
        self.with_param("temperature", temperature)
    }

    /// Sets any generation parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Sets a provider-specific request field.
    #[must_use]
    pub fn with_api_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.api_args.insert(key.into(), value.into());
        self
    }
}

/// Session-wide behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Instructions applied once to the whole session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Progress surfacing.
    #[serde(default)]
    pub echo: EchoMode,
    /// Rows in flight at once inside the chat client (default: 10).
    #[serde(default = "default_max_active")]
    pub max_active: usize,
    /// Attempts per row inside the chat client (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

const fn default_max_active() -> usize {
    10
}

const fn default_max_attempts() -> usize {
    3
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            echo: EchoMode::None,
            max_active: default_max_active(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl SessionConfig {
    /// Sets the system prompt.
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
}

/// Serde for the optional credential; never writes the secret.
mod secret_string_serde {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match secret {
            Some(_) => serializer.serialize_str("***REDACTED***"),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(SecretString::from))
    }
}
