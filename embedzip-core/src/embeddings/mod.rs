//! Embeddings module for transcript indexing
//!
//! Provides recursive text chunking and remote embedding generation.

pub mod chunker;
pub mod gemini;
pub mod model;

pub use chunker::{Chunk, ChunkerConfig, ChunkerError, TextSplitter};
pub use gemini::{GeminiConfig, GeminiEmbedder};
pub use model::{Embedder, EmbedderState, MockEmbeddingModel};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embeddings unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid embedding configuration: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
