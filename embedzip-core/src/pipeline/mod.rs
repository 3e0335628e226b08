//! Transcript batch to zipped index pipeline
//!
//! Sequential stages, run once per invocation:
//! 1. Intake - copy uploads into a fresh scratch directory
//! 2. Load - read `.txt` files on a worker pool
//! 3. Chunk - recursive character splitting
//! 4. Embed - one batch call to the shared embedder
//! 5. Index - build the flat index and save its two artifacts
//! 6. Package - zip the artifacts to the configured archive path
//!
//! Scratch directories are `TempDir` guards owned by the run, so they are
//! removed on every exit path.

pub mod config;

pub use config::PipelineConfig;

use crate::bundle::{self, BundleError};
use crate::embeddings::{
    Chunk, ChunkerError, Embedder, EmbedderState, EmbeddingError, TextSplitter,
};
use crate::index::{artifacts_exist, FlatIndex, IndexError, IndexWriter, ParquetIndexWriter};
use crate::intake::{stage_uploads, IntakeError, UploadedFile};
use crate::loader::{LoadError, SkippedFile, TranscriptLoader};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;

/// Name of the directory the index is saved into before packaging
const SAVE_DIR_NAME: &str = "faiss_index";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("ERROR: Embeddings model could not be initialized. Check API key and logs. ({0})")]
    EmbeddingsUnavailable(String),

    #[error("Please upload transcript files first.")]
    NoFiles,

    #[error("Error handling one or more uploaded files during copy: {0}")]
    Intake(#[from] IntakeError),

    #[error("Could not load any text from the uploaded files. Ensure they are valid .txt files.")]
    NoDocuments,

    #[error("Error: No text chunks were generated after splitting the documents.")]
    NoChunks,

    #[error("Invalid chunking configuration: {0}")]
    Chunker(#[from] ChunkerError),

    #[error("Scratch directory error: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Index files not found at {0:?} after saving")]
    MissingArtifacts(PathBuf),

    #[error("Packaging error: {0}")]
    Packaging(#[from] BundleError),
}

impl PipelineError {
    /// Coarse failure class, used in logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmbeddingsUnavailable(_) | Self::Chunker(_) => "configuration",
            Self::NoFiles => "input",
            Self::Intake(_) | Self::Scratch(_) => "intake",
            Self::NoDocuments | Self::Load(_) => "load",
            Self::NoChunks => "chunk",
            Self::Embedding(_) | Self::Index(_) | Self::MissingArtifacts(_) => "remote",
            Self::Packaging(_) => "packaging",
        }
    }

    /// Status text shown to the caller
    pub fn status_message(&self) -> String {
        match self {
            Self::EmbeddingsUnavailable(_)
            | Self::NoFiles
            | Self::Intake(_)
            | Self::NoDocuments
            | Self::NoChunks => self.to_string(),
            other => format!("An error occurred during processing: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Details of a successful run
#[derive(Debug)]
pub struct RunReport {
    pub files: usize,
    pub documents: usize,
    pub skipped: Vec<SkippedFile>,
    pub chunks: usize,
    pub archive: PathBuf,
    pub archive_bytes: u64,
}

impl RunReport {
    pub fn status_message(&self) -> String {
        format!(
            "Successfully processed {} file(s). Index saved and zipped.",
            self.files
        )
    }
}

/// What the caller displays: a status line and, on success, the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: String,
    pub archive: Option<PathBuf>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.archive.is_some()
    }
}

/// Builds a zipped index from a batch of uploaded transcripts
pub struct IndexBuilder {
    config: PipelineConfig,
    embedder: EmbedderState,
    writer: Arc<dyn IndexWriter>,
}

impl IndexBuilder {
    pub fn new(config: PipelineConfig, embedder: EmbedderState) -> Self {
        Self {
            config,
            embedder,
            writer: Arc::new(ParquetIndexWriter::new()),
        }
    }

    /// Replace the artifact writer
    pub fn with_writer(mut self, writer: impl IndexWriter + 'static) -> Self {
        self.writer = Arc::new(writer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline and fold the result into a [`RunOutcome`].
    ///
    /// Never returns an error; failures become a status string with no
    /// archive.
    pub async fn run(&self, files: &[UploadedFile]) -> RunOutcome {
        match self.try_run(files).await {
            Ok(report) => {
                let status = report.status_message();
                tracing::info!("{}", status);
                RunOutcome {
                    status,
                    archive: Some(report.archive),
                }
            }
            Err(e) => {
                match &e {
                    PipelineError::NoFiles => tracing::warn!("{}", e),
                    _ => tracing::error!(category = e.category(), "Index build failed: {}", e),
                }
                RunOutcome {
                    status: e.status_message(),
                    archive: None,
                }
            }
        }
    }

    /// Run the pipeline, returning the typed error on failure
    pub async fn try_run(&self, files: &[UploadedFile]) -> Result<RunReport> {
        let embedder = match &self.embedder {
            EmbedderState::Ready(embedder) => Arc::clone(embedder),
            EmbedderState::Unavailable(reason) => {
                return Err(PipelineError::EmbeddingsUnavailable(reason.clone()))
            }
        };

        if files.is_empty() {
            return Err(PipelineError::NoFiles);
        }

        let splitter = TextSplitter::new(self.config.chunker_config())?;

        // Guards are dropped (and directories removed) on every return below
        let work_dir = self.scratch_dir("embedzip-upload-")?;
        let index_dir = self.scratch_dir("embedzip-index-")?;
        tracing::debug!("Scratch directories {:?} and {:?}", work_dir.path(), index_dir.path());

        stage_uploads(files, work_dir.path())?;

        let loader = TranscriptLoader::new(self.config.loader_workers);
        let load_root = work_dir.path().to_path_buf();
        let load_report = tokio::task::spawn_blocking(move || loader.load(&load_root))
            .await
            .map_err(|_| LoadError::WorkerPanicked)??;

        if load_report.documents.is_empty() {
            return Err(PipelineError::NoDocuments);
        }

        let chunks = splitter.chunk_documents(&load_report.documents);
        tracing::info!(
            "Split {} documents into {} chunks",
            load_report.documents.len(),
            chunks.len()
        );
        if chunks.is_empty() {
            return Err(PipelineError::NoChunks);
        }

        let index = embed_and_build(embedder.as_ref(), &chunks).await?;

        let save_dir = index_dir.path().join(SAVE_DIR_NAME);
        self.writer.save(&index, &save_dir)?;
        if !artifacts_exist(&save_dir) {
            return Err(PipelineError::MissingArtifacts(save_dir));
        }

        let archive_bytes = bundle::write_bundle(&save_dir, &self.config.archive_path)?;

        release(work_dir);
        release(index_dir);

        Ok(RunReport {
            files: files.len(),
            documents: load_report.documents.len(),
            skipped: load_report.skipped,
            chunks: chunks.len(),
            archive: self.config.archive_path.clone(),
            archive_bytes,
        })
    }

    fn scratch_dir(&self, prefix: &str) -> Result<TempDir> {
        fs::create_dir_all(&self.config.scratch_root).map_err(PipelineError::Scratch)?;
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.config.scratch_root)
            .map_err(PipelineError::Scratch)
    }
}

async fn embed_and_build(
    embedder: &dyn Embedder,
    chunks: &[Chunk],
) -> Result<FlatIndex> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    tracing::info!(
        "Embedding {} chunks with {}",
        texts.len(),
        embedder.model_name()
    );
    let embeddings = embedder.embed_documents(&texts).await?;

    Ok(FlatIndex::build(
        embedder.model_name(),
        embedder.dimension(),
        chunks,
        embeddings,
    )?)
}

/// Remove a scratch directory after a successful run
fn release(dir: TempDir) {
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        tracing::warn!("Failed to remove scratch directory {:?}: {}", path, e);
    }
}
