/// `polybuild cache` command implementation
///
/// Inspects and prunes the build cache (stats, list, clean).
use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::{CacheArgs, CacheCommands};
use crate::cli_utils::{format_size, polybuild_prefix};
use polybuild::adapter::AdapterRegistry;
use polybuild::builder::Builder;
use polybuild::cache::{CacheEntry, Fingerprint};
use polybuild::config::BuilderConfig;

pub fn run(config: BuilderConfig, args: &CacheArgs) -> Result<()> {
    // Cache maintenance never compiles, so no adapters are needed.
    let builder = Builder::with_adapters(config, AdapterRegistry::new());

    match &args.command {
        CacheCommands::Stats { json } => stats(&builder, *json),
        CacheCommands::List { json } => list(&builder, *json),
        CacheCommands::Clean { fingerprint, all } => clean(&builder, fingerprint.as_deref(), *all),
    }
}

/// Show cache statistics
fn stats(builder: &Builder, json: bool) -> Result<()> {
    let stats = builder.cache_stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Build Cache Statistics");
    println!();
    println!("Location: {}", stats.root.display());
    println!("Enabled: {}", if stats.enabled { "yes" } else { "no" });
    if builder.cache().is_degraded() {
        println!("Index: corrupt (ignored until the next successful build)");
    }
    println!("Total entries: {}", stats.entry_count);
    println!("Total size: {}", format_size(stats.total_size));

    Ok(())
}

#[derive(Serialize)]
struct ListedEntry {
    fingerprint: Fingerprint,
    #[serde(flatten)]
    entry: CacheEntry,
}

/// List cached builds, oldest first
fn list(builder: &Builder, json: bool) -> Result<()> {
    let entries = builder.cache().entries();

    if json {
        let listed: Vec<_> = entries
            .into_iter()
            .map(|(fingerprint, entry)| ListedEntry { fingerprint, entry })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No cached builds.");
        return Ok(());
    }

    println!("Cached builds ({} entries):", entries.len());
    println!();

    for (fingerprint, entry) in entries {
        println!("  {}", fingerprint);
        println!("    Artifact: {}", entry.artifact.display());
        println!(
            "    Created: {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Remove one entry or everything
fn clean(builder: &Builder, fingerprint: Option<&str>, all: bool) -> Result<()> {
    if all {
        eprintln!("{} Cleaning the whole build cache...", polybuild_prefix());
        builder.clear_cache().context("Failed to clean the build cache")?;
        eprintln!("{} Build cache cleaned.", polybuild_prefix());
        return Ok(());
    }

    let Some(fingerprint) = fingerprint else {
        anyhow::bail!("Specify --all to clean the whole cache, or provide a fingerprint");
    };

    let fp: Fingerprint = fingerprint
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    if builder
        .cache()
        .remove(&fp)
        .with_context(|| format!("Failed to remove cache entry {}", fp))?
    {
        eprintln!("{} Removed {}", polybuild_prefix(), fp);
    } else {
        eprintln!("{} No cache entry for {}", polybuild_prefix(), fp);
    }

    Ok(())
}
