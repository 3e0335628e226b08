mod commands;

use clap::{Args, Parser, Subcommand};
use embedzip_core::credentials::GOOGLE_API_KEY;
use embedzip_core::embeddings::{GeminiConfig, MockEmbeddingModel};
use embedzip_core::{EmbedderState, EnvStore, MemoryStore};
use std::path::PathBuf;

/// Embedding dimension used by `--offline`
const OFFLINE_DIMENSION: usize = 384;

#[derive(Parser)]
#[command(name = "embedzip")]
#[command(about = "Turn transcripts into a downloadable vector index", long_about = None)]
#[command(version)]
struct Cli {
    /// Google AI API key
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use a deterministic local embedder instead of the Google API
    #[arg(long, global = true)]
    offline: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a zipped index from transcript files
    Build(BuildArgs),

    /// Show what a bundle contains
    Inspect {
        /// Path to the zip archive
        bundle: PathBuf,
    },

    /// Query a bundle
    Search {
        /// Path to the zip archive
        bundle: PathBuf,

        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "5")]
        limit: usize,
    },
}

#[derive(Args)]
pub struct BuildArgs {
    /// Transcript files to index
    pub files: Vec<PathBuf>,

    /// Where to write the zip archive
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Directory for per-run scratch directories
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Maximum characters per chunk
    #[arg(long, default_value = "800")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, default_value = "180")]
    pub chunk_overlap: usize,

    /// Number of file read workers
    #[arg(long)]
    pub workers: Option<usize>,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "embedzip=debug,embedzip_core=debug"
    } else {
        "embedzip=info,embedzip_core=info"
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .compact()
        .init();
}

/// Initialize the embedder once for the whole process
fn init_embedder(api_key: Option<String>, offline: bool) -> EmbedderState {
    if offline {
        tracing::info!("Using offline embeddings ({})", MockEmbeddingModel::MODEL_NAME);
        return EmbedderState::ready(MockEmbeddingModel::new(OFFLINE_DIMENSION));
    }

    match api_key {
        Some(key) => EmbedderState::gemini(
            &MemoryStore::with_credentials([(GOOGLE_API_KEY, key)]),
            GeminiConfig::default(),
        ),
        None => EmbedderState::gemini(&EnvStore, GeminiConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let embedder = init_embedder(cli.api_key, cli.offline);

    match cli.command {
        Commands::Build(args) => {
            commands::build::run(args, embedder).await?;
        }
        Commands::Inspect { bundle } => {
            commands::inspect::run(&bundle)?;
        }
        Commands::Search {
            bundle,
            query,
            limit,
        } => {
            commands::search::run(&bundle, &query, limit, &embedder).await?;
        }
    }

    Ok(())
}
