//! Embedding model abstraction
//!
//! The embedder is initialized once at process startup and shared
//! read-only afterwards. [`EmbedderState`] records whether that
//! initialization succeeded so callers can fail fast without retrying.

use super::gemini::{GeminiConfig, GeminiEmbedder};
use super::{EmbeddingError, Result};
use crate::credentials::{CredentialStore, GOOGLE_API_KEY};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Trait for embedding models (allows mocking)
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model, stored alongside the index
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Generate embeddings for texts that will be stored in an index
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate an embedding for a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Outcome of the one-time embedder initialization
#[derive(Clone)]
pub enum EmbedderState {
    Ready(Arc<dyn Embedder>),
    Unavailable(String),
}

impl EmbedderState {
    /// Initialize the Google embedder from the `GOOGLE_API_KEY` credential.
    ///
    /// Never fails: a missing credential or a client that cannot be built
    /// yields [`EmbedderState::Unavailable`] with the reason.
    pub fn gemini(credentials: &dyn CredentialStore, template: GeminiConfig) -> Self {
        let api_key = match credentials.get(GOOGLE_API_KEY) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("Cannot initialize Google embeddings: {}", e);
                return Self::Unavailable(e.to_string());
            }
        };

        let config = GeminiConfig {
            api_key,
            ..template
        };
        let model = config.model.clone();

        match GeminiEmbedder::new(config) {
            Ok(embedder) => {
                tracing::info!("Google AI embeddings ({}) initialized", model);
                Self::Ready(Arc::new(embedder))
            }
            Err(e) => {
                tracing::error!("Error initializing embeddings model '{}': {}", model, e);
                Self::Unavailable(e.to_string())
            }
        }
    }

    /// Wrap an already constructed embedder
    pub fn ready(embedder: impl Embedder + 'static) -> Self {
        Self::Ready(Arc::new(embedder))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Get the shared embedder, or the reason it is unavailable
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        match self {
            Self::Ready(embedder) => Ok(Arc::clone(embedder)),
            Self::Unavailable(reason) => Err(EmbeddingError::Unavailable(reason.clone())),
        }
    }
}

impl fmt::Debug for EmbedderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(embedder) => f
                .debug_tuple("Ready")
                .field(&embedder.model_name())
                .finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Mock embedding model for tests and offline runs (returns deterministic embeddings)
#[derive(Debug, Clone)]
pub struct MockEmbeddingModel {
    dim: usize,
}

impl MockEmbeddingModel {
    pub const MODEL_NAME: &'static str = "mock-hash-embedding";

    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Generate a deterministic embedding based on text hash
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let hash = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

        let mut embedding: Vec<f32> = (0..self.dim)
            .map(|i| {
                let val = ((hash.wrapping_mul(i as u64 + 1)) % 1000) as f32 / 1000.0 - 0.5;
                val / (self.dim as f32).sqrt()
            })
            .collect();

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|x| *x /= norm);
        }

        embedding
    }
}

#[async_trait]
impl Embedder for MockEmbeddingModel {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }
}
