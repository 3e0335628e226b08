use anyhow::Context;
use embedzip_core::bundle::open_bundle;
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(bundle: &Path) -> anyhow::Result<()> {
    let opened =
        open_bundle(bundle).with_context(|| format!("Failed to open {}", bundle.display()))?;
    let index = opened.load_index()?;

    println!("Bundle: {}", bundle.display());
    println!("========");
    println!();
    println!("Entries:   {}", opened.entries().join(", "));
    println!("Vectors:   {}", index.len());
    println!("Dimension: {}", index.dimension());
    println!("Model:     {}", index.model());
    println!("Created:   {}", index.created_at().format("%Y-%m-%d %H:%M:%S UTC"));

    let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in index.entries() {
        *by_source.entry(entry.source.as_str()).or_default() += 1;
    }

    if !by_source.is_empty() {
        println!();
        println!("By Source:");
        println!("----------");

        for (source, chunks) in by_source {
            println!("  {}: {} chunks", source, chunks);
        }
    }

    Ok(())
}
