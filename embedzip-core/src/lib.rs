pub mod bundle;
pub mod credentials;
pub mod embeddings;
pub mod index;
pub mod intake;
pub mod loader;
pub mod pipeline;

pub use credentials::{CredentialStore, EnvStore, MemoryStore};
pub use embeddings::{Embedder, EmbedderState};
pub use index::FlatIndex;
pub use intake::UploadedFile;
pub use pipeline::{IndexBuilder, PipelineConfig, PipelineError, RunOutcome};
