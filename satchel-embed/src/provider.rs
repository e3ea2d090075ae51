//! Embedding and completion providers
//!
//! The rest of the system only depends on the [`EmbeddingProvider`] and
//! [`TextGenerator`] traits; [`OpenAiProvider`] is the concrete
//! OpenAI-compatible HTTP implementation. Anything speaking the same
//! wire format (OpenAI, Azure, local inference servers) works through
//! the `base_url` in [`EmbedConfig`].

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use half::f16;
use serde::{Deserialize, Serialize};

/// `text-embedding-3-small` accepts 8 192 tokens per input. Plain prose
/// tokenizes around 4 chars/token, dense content closer to 2, so capping
/// the payload at 8 000 chars stays inside the window either way.
const MAX_EMBED_CHARS: usize = 8_000;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result from f16 vectors; the dimension is taken from the
    /// first vector (0 when empty).
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Identifier of the model configuration backing this provider
    fn model_id(&self) -> String;
}

/// Trait for providers that can generate an answer from a prompt plus
/// retrieved context.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`, grounded in `context`.
    async fn generate(&self, prompt: &str, context: &str) -> Result<String>;
}

/// OpenAI-compatible HTTP provider for embeddings and completions.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    config: EmbedConfig,
    client: reqwest::Client,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiProvider {
    /// Build a provider from configuration, resolving the API key from
    /// the environment. Fails fast when the key is absent so indexing
    /// runs never start without a working provider.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::new();
        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    async fn post_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let request = EmbeddingsRequest {
            model: &self.config.embedding_model,
            input: inputs,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api { status, body });
        }

        let body: EmbeddingsResponse = response.json().await?;
        if body.data.len() != inputs.len() {
            return Err(EmbedError::MissingPayload {
                what: "one embedding per input",
            });
        }

        // The API is allowed to reorder entries; `index` restores input order.
        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::MissingPayload { what: "embeddings" })
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();

        tracing::debug!("Requesting embeddings for {} texts", truncated.len());

        // Batch requests to keep payloads small.
        let batch_size = 16;
        let mut all_embeddings = Vec::with_capacity(truncated.len());
        for batch in truncated.chunks(batch_size) {
            let raw = self.post_embeddings(batch).await?;
            all_embeddings.extend(raw.into_iter().map(to_f16));
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_id(&self) -> String {
        self.config.model_id()
    }
}

#[async_trait]
impl TextGenerator for OpenAiProvider {
    async fn generate(&self, prompt: &str, context: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let system = "You answer questions using only the provided context. \
                      If the context does not contain the answer, say so \
                      instead of guessing."
            .to_string();
        let user = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{context}\n\nQuestion: {prompt}")
        };

        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Api { status, body });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(EmbedError::MissingPayload {
                what: "completion choices",
            })
    }
}

/// Stored and indexed vectors are f16; the wire format is f32.
fn to_f16(embedding: Vec<f32>) -> Vec<f16> {
    embedding.into_iter().map(f16::from_f32).collect()
}

/// Truncate `text` to at most `MAX_EMBED_CHARS` bytes on a UTF-8 char
/// boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
