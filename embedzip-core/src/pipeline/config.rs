//! Pipeline configuration

use crate::bundle::ARCHIVE_NAME;
use crate::embeddings::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embeddings::ChunkerConfig;
use std::path::{Path, PathBuf};

/// Configuration for one index build
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks
    pub chunk_overlap: usize,
    /// Number of file read workers
    pub loader_workers: usize,
    /// Directory in which per-run scratch directories are created.
    ///
    /// Created on first use if missing and left in place afterwards; only
    /// the per-run directories inside it are removed.
    pub scratch_root: PathBuf,
    /// Final location of the zipped index
    pub archive_path: PathBuf,
}

impl PipelineConfig {
    /// Create a config rooted at `scratch_root`, with the archive written
    /// into the same directory
    pub fn new(scratch_root: impl AsRef<Path>) -> Self {
        let scratch_root = scratch_root.as_ref().to_path_buf();
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            loader_workers: num_cpus::get(),
            archive_path: scratch_root.join(ARCHIVE_NAME),
            scratch_root,
        }
    }

    pub fn with_archive_path(mut self, archive_path: impl AsRef<Path>) -> Self {
        self.archive_path = archive_path.as_ref().to_path_buf();
        self
    }

    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.loader_workers = workers.max(1);
        self
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();

        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.chunk_overlap, 180);
        assert!(config.loader_workers >= 1);
        assert_eq!(config.scratch_root, std::env::temp_dir());
        assert_eq!(
            config.archive_path,
            std::env::temp_dir().join("faiss_index_google.zip")
        );
    }

    #[test]
    fn test_config_custom_archive() {
        let config = PipelineConfig::new("/tmp/scratch").with_archive_path("/srv/out/index.zip");

        assert_eq!(config.scratch_root, PathBuf::from("/tmp/scratch"));
        assert_eq!(config.archive_path, PathBuf::from("/srv/out/index.zip"));
    }

    #[test]
    fn test_config_min_workers() {
        let config = PipelineConfig::new("/tmp/test").with_workers(0);

        assert_eq!(config.loader_workers, 1);
    }

    #[test]
    fn test_config_chunking() {
        let config = PipelineConfig::new("/tmp/test").with_chunking(200, 20);

        let chunker = config.chunker_config();
        assert_eq!(chunker.chunk_size, 200);
        assert_eq!(chunker.chunk_overlap, 20);
    }
}
