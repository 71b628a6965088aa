//! Credential lookup.
//!
//! An explicit key in [`ModelConfig`](crate::config::ModelConfig) always wins.
//! Otherwise the key is read from a [`CredentialSource`], which defaults to
//! the process environment.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};

use crate::errors::CodingError;

/// Environment key holding the API credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Somewhere credentials can be looked up by key.
pub trait CredentialSource: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<SecretString>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn get(&self, key: &str) -> Option<SecretString> {
        std::env::var(key).ok().map(SecretString::from)
    }
}

/// Fixed in-memory values.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, SecretString>,
}

impl StaticCredentials {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .insert(key.into(), SecretString::from(value.into()));
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn get(&self, key: &str) -> Option<SecretString> {
        self.values.get(key).cloned()
    }
}

/// Resolves the API key: `explicit` first, then [`API_KEY_ENV`] in `source`.
/// Blank values count as absent.
///
/// # Errors
///
/// Returns [`CodingError::MissingCredential`] when neither yields a key.
pub fn resolve_api_key(
    explicit: Option<&SecretString>,
    source: &dyn CredentialSource,
) -> Result<SecretString, CodingError> {
    let present = |key: &SecretString| !key.expose_secret().trim().is_empty();
    explicit
        .cloned()
        .filter(present)
        .or_else(|| source.get(API_KEY_ENV).filter(present))
        .ok_or_else(|| CodingError::MissingCredential {
            key: API_KEY_ENV.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_wins() {
        let source = StaticCredentials::new().with(API_KEY_ENV, "from-env");
        let explicit = SecretString::from("explicit");
        let key = resolve_api_key(Some(&explicit), &source).unwrap();
        assert_eq!(key.expose_secret(), "explicit");
    }

    #[test]
    fn test_falls_back_to_source() {
        let source = StaticCredentials::new().with(API_KEY_ENV, "from-env");
        let key = resolve_api_key(None, &source).unwrap();
        assert_eq!(key.expose_secret(), "from-env");
    }

    #[test]
    fn test_missing_and_blank_keys() {
        let err = resolve_api_key(None, &StaticCredentials::new()).unwrap_err();
        assert!(matches!(err, CodingError::MissingCredential { ref key } if key == API_KEY_ENV));

        let blank = StaticCredentials::new().with(API_KEY_ENV, "  ");
        assert!(resolve_api_key(None, &blank).is_err());

        let source = StaticCredentials::new().with(API_KEY_ENV, "from-env");
        let key = resolve_api_key(Some(&SecretString::from("")), &source).unwrap();
        assert_eq!(key.expose_secret(), "from-env");
    }
}
