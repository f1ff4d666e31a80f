//! Environment configuration.

use std::env;
use std::fmt::{self, Debug};

use relay_openai_model::{OpenAIConfig, OpenAIConfigBuilder};
use thiserror::Error;

/// Environment variables that must be set before anything starts.
pub const REQUIRED_VARS: [&str; 3] = ["QWEN_API_KEY", "BASE_URL", "MODEL"];

/// Errors in the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Some required variables are unset or empty.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVars(Vec<&'static str>),
}

/// Settings read from the environment.
#[derive(Clone)]
pub struct AppConfig {
    api_key: String,
    base_url: String,
    model: String,
}

impl Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Every missing variable is reported, not only the first one.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut values = Vec::with_capacity(REQUIRED_VARS.len());
        let mut missing = vec![];
        for key in REQUIRED_VARS {
            match lookup(key).filter(|value| !value.trim().is_empty()) {
                Some(value) => values.push(value),
                None => missing.push(key),
            }
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }

        let mut values = values.into_iter();
        let mut next = || values.next().unwrap_or_default();
        Ok(Self {
            api_key: next(),
            base_url: next(),
            model: next(),
        })
    }

    /// Returns the model identifier.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the provider configuration.
    pub fn openai_config(&self) -> OpenAIConfig {
        OpenAIConfigBuilder::with_api_key(&self.api_key)
            .with_base_url(&self.base_url)
            .with_model(&self.model)
            .build()
    }
}
