//! Google Generative AI embeddings client
//!
//! Calls the `batchEmbedContents` endpoint of the Generative Language API.
//!
//! API Documentation: https://ai.google.dev/api/embeddings

use super::model::Embedder;
use super::{EmbeddingError, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "models/text-embedding-004";
pub const DEFAULT_DIMENSION: usize = 768;

/// The API accepts at most 100 requests per batch call
pub const MAX_BATCH_SIZE: usize = 100;

/// Configuration for the Google embeddings client
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Fully qualified model name, including the `models/` prefix
    pub model: String,
    pub base_url: String,
    /// Texts per `batchEmbedContents` call (clamped to 1..=100)
    pub batch_size: usize,
    /// Expected vector length; responses of any other length are rejected
    pub dimension: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            batch_size: MAX_BATCH_SIZE,
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("batch_size", &self.batch_size)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Embedder backed by the Google Generative Language API
pub struct GeminiEmbedder {
    client: Client,
    config: GeminiConfig,
}

impl GeminiEmbedder {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(EmbeddingError::Config("API key is empty".to_string()));
        }
        if !config.model.starts_with("models/") {
            return Err(EmbeddingError::Config(format!(
                "model name must start with 'models/': {}",
                config.model
            )));
        }
        if config.dimension == 0 {
            return Err(EmbeddingError::Config(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        let config = GeminiConfig {
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ..config
        };

        Ok(Self {
            client: build_client()?,
            config,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:batchEmbedContents",
            self.config.base_url, self.config.model
        )
    }

    async fn embed_batch(&self, texts: &[String], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.config.model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if status == 401 || status == 403 {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Auth(format!(
                "{}: {}",
                status,
                truncate(&text, 200)
            )));
        }

        if status == 429 {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Quota(truncate(&text, 200)));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!(
                "{}: {}",
                status,
                truncate(&text, 500)
            )));
        }

        let text = response.text().await?;
        let parsed: BatchEmbedResponse = serde_json::from_str(&text)
            .map_err(|e| EmbeddingError::Parse(format!("{}: {}", e, truncate(&text, 200))))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        parsed
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| {
                if embedding.values.len() != self.config.dimension {
                    return Err(EmbeddingError::Parse(format!(
                        "embedding {} has dimension {}, expected {}",
                        i,
                        embedding.values.len(),
                        self.config.dimension
                    )));
                }
                Ok(embedding.values)
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        let batches = texts.len().div_ceil(self.config.batch_size);

        for (i, batch) in texts.chunks(self.config.batch_size).enumerate() {
            tracing::debug!("Embedding batch {}/{} ({} texts)", i + 1, batches, batch.len());
            embeddings.extend(self.embed_batch(batch, TaskType::RetrievalDocument).await?);
        }

        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self
            .embed_batch(&[text.to_string()], TaskType::RetrievalQuery)
            .await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::Parse("empty embedding response".to_string()))
    }
}

fn build_client() -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    Ok(Client::builder()
        .default_headers(headers)
        .user_agent(concat!("embedzip/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
