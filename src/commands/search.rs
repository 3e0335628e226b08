use anyhow::Context;
use embedzip_core::bundle::open_bundle;
use embedzip_core::EmbedderState;
use std::path::Path;

const SNIPPET_CHARS: usize = 200;

pub async fn run(
    bundle: &Path,
    query: &str,
    limit: usize,
    embedder: &EmbedderState,
) -> anyhow::Result<()> {
    let embedder = embedder.embedder()?;

    let opened =
        open_bundle(bundle).with_context(|| format!("Failed to open {}", bundle.display()))?;
    let index = opened.load_index()?;

    if embedder.dimension() != index.dimension() {
        anyhow::bail!(
            "Bundle was built with {} (dim {}), but the active embedder is {} (dim {})",
            index.model(),
            index.dimension(),
            embedder.model_name(),
            embedder.dimension()
        );
    }

    println!("Searching for: {}\n", query);

    let query_embedding = embedder.embed_query(query).await?;
    let hits = index.search(&query_embedding, limit)?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} results:\n", hits.len());

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} [chunk {}] (distance {:.4})",
            rank + 1,
            hit.entry.source,
            hit.entry.chunk_index,
            hit.distance
        );
        println!("   {}", snippet(&hit.entry.text));
        println!();
    }

    Ok(())
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut)
}
