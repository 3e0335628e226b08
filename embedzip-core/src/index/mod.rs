//! Vector index over embedded chunks
//!
//! [`FlatIndex`] keeps every vector in memory and answers nearest-neighbour
//! queries by exhaustive squared-L2 scan. On disk an index is exactly two
//! artifacts: the vector file and the docstore file (see [`store`]).

pub mod store;

pub use store::{artifact_paths, artifacts_exist, load_index, IndexWriter, ParquetIndexWriter};

#[cfg(test)]
pub use store::MockIndexWriter;

use crate::embeddings::Chunk;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Vector artifact file name
pub const INDEX_FILE: &str = "index.faiss";

/// Docstore artifact file name
pub const DOCSTORE_FILE: &str = "index.pkl";

/// Distance metric recorded with every index
pub const METRIC: &str = "l2";

pub const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Cannot build an index without chunks")]
    Empty,

    #[error("Chunk count {chunks} != embedding count {embeddings}")]
    CountMismatch { chunks: usize, embeddings: usize },

    #[error("Embedding {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt index: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Docstore record for one indexed chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub docstore_id: String,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}

impl IndexEntry {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            docstore_id: format!("{}:{}", chunk.source, chunk.chunk_index),
            source: chunk.source.clone(),
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
        }
    }
}

/// A search result, closest first
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    pub position: usize,
    /// Squared L2 distance to the query
    pub distance: f32,
    pub entry: &'a IndexEntry,
}

/// Exact nearest-neighbour index
#[derive(Debug, Clone)]
pub struct FlatIndex {
    model: String,
    dimension: usize,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
    /// Row-major, `entries.len() * dimension` values
    vectors: Vec<f32>,
}

impl FlatIndex {
    /// Build an index from chunks and their embeddings, paired by position.
    pub fn build(
        model: &str,
        dimension: usize,
        chunks: &[Chunk],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }

        if chunks.len() != embeddings.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let mut vectors = Vec::with_capacity(chunks.len() * dimension);
        for (position, embedding) in embeddings.into_iter().enumerate() {
            if embedding.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            vectors.extend(embedding);
        }

        let entries = chunks.iter().map(IndexEntry::from_chunk).collect();

        Ok(Self {
            model: model.to_string(),
            dimension,
            created_at: Utc::now(),
            entries,
            vectors,
        })
    }

    pub(crate) fn from_parts(
        model: String,
        dimension: usize,
        created_at: DateTime<Utc>,
        entries: Vec<IndexEntry>,
        vectors: Vec<f32>,
    ) -> Result<Self> {
        if vectors.len() != entries.len() * dimension {
            return Err(IndexError::Corrupt(format!(
                "{} vector values for {} entries of dimension {}",
                vectors.len(),
                entries.len(),
                dimension
            )));
        }

        Ok(Self {
            model,
            dimension,
            created_at,
            entries,
            vectors,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub(crate) fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    /// Return the `k` entries closest to `query`.
    ///
    /// Ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                position: 0,
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|v| squared_l2(v, query))
            .enumerate()
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, distance)| SearchHit {
                position,
                distance,
                entry: &self.entries[position],
            })
            .collect())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
