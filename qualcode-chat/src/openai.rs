//! OpenAI-compatible sessions backed by rig's OpenAI provider.
//!
//! Any endpoint speaking the chat-completions protocol works: OpenAI itself,
//! Azure-style gateways, Ollama, LM Studio, vLLM.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::providers::openai;
use secrecy::ExposeSecret;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::session::{ChatSession, RigCompleter, RigSession, StructuredChat};

/// Opens [`RigSession`]s against an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChat;

impl OpenAiChat {
    /// Creates the session factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Rejects configurations that cannot produce a working session.
///
/// # Errors
///
/// Returns [`ChatError::Init`] for an empty model, an empty key, or a base
/// URL that is not `http(s)://`.
pub fn check_config(config: &ChatConfig) -> Result<(), ChatError> {
    if config.model.trim().is_empty() {
        return Err(ChatError::Init("model identifier is empty".to_string()));
    }
    if config.api_key.expose_secret().trim().is_empty() {
        return Err(ChatError::Init("api key is empty".to_string()));
    }
    let url = config.base_url.trim();
    let host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or_default();
    if host.is_empty() || host.starts_with('/') {
        return Err(ChatError::Init(format!(
            "base url '{}' is not an http(s) URL",
            config.base_url
        )));
    }
    Ok(())
}

#[async_trait]
impl StructuredChat for OpenAiChat {
    async fn open_session(&self, config: &ChatConfig) -> Result<Box<dyn ChatSession>, ChatError> {
        check_config(config)?;

        let client: openai::CompletionsClient = openai::CompletionsClient::builder()
            .api_key(config.api_key.expose_secret())
            .base_url(config.base_url.trim_end_matches('/'))
            .build()
            .map_err(|e| ChatError::Init(e.to_string()))?;
        let model = client.completion_model(config.model.as_str());

        tracing::debug!(
            event = "session_opened",
            model = %config.model,
            base_url = %config.base_url,
            echo = %config.echo,
            "session_opened"
        );

        Ok(Box::new(RigSession::new(RigCompleter::new(model), config)))
    }
}
