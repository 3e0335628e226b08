use crate::BuildArgs;
use embedzip_core::{EmbedderState, IndexBuilder, PipelineConfig, UploadedFile};

pub async fn run(args: BuildArgs, embedder: EmbedderState) -> anyhow::Result<()> {
    let mut config = PipelineConfig::default()
        .with_chunking(args.chunk_size, args.chunk_overlap);
    if let Some(scratch_dir) = args.scratch_dir {
        config.scratch_root = scratch_dir;
    }
    if let Some(output) = args.output {
        config = config.with_archive_path(output);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    let files: Vec<UploadedFile> = args
        .files
        .into_iter()
        .map(UploadedFile::from_path)
        .collect();

    match IndexBuilder::new(config, embedder).try_run(&files).await {
        Ok(report) => {
            println!("{}", report.status_message());
            println!();
            println!("Documents: {}", report.documents);
            println!("Chunks: {}", report.chunks);
            if !report.skipped.is_empty() {
                println!("Skipped {} file(s):", report.skipped.len());
                for skipped in &report.skipped {
                    println!("  {}: {}", skipped.path.display(), skipped.reason);
                }
            }
            println!(
                "Archive: {} ({} bytes)",
                report.archive.display(),
                report.archive_bytes
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(category = e.category(), "Index build failed: {}", e);
            anyhow::bail!("{}", e.status_message())
        }
    }
}
