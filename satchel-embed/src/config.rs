//! Configuration for the OpenAI-compatible provider

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for an OpenAI-compatible embedding/completion endpoint.
///
/// The API key is never stored in configuration files; it is resolved
/// from the environment variable named by `api_key_env` when the
/// provider is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Base URL of the API, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Model used for embedding requests
    pub embedding_model: String,
    /// Model used for answer generation
    pub chat_model: String,
    /// Dimension of the vectors the embedding model produces
    pub dimension: usize,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            dimension: 1536,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl EmbedConfig {
    pub fn new(embedding_model: impl Into<String>, dimension: usize) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            dimension,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chat_model(mut self, chat_model: impl Into<String>) -> Self {
        self.chat_model = chat_model.into();
        self
    }

    pub fn with_api_key_env(mut self, api_key_env: impl Into<String>) -> Self {
        self.api_key_env = api_key_env.into();
        self
    }

    /// A stable identifier for the model configuration, recorded next to
    /// every embedding this provider produces.
    pub fn model_id(&self) -> String {
        format!("{}:{}", self.embedding_model, self.dimension)
    }

    /// Read the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(EmbedError::MissingApiKey {
                env_var: self.api_key_env.clone(),
            }),
        }
    }
}
