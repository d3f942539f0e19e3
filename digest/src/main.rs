//! newsmorph: pair every news item with its closest match across feeds.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use newsmorph_digest::config::load_feeds_file;
use newsmorph_digest::feed::source_for;
use newsmorph_digest::{DigestConfig, DigestEngine, EmbeddingProviderType, FeedSource};

/// Find near-duplicate coverage across news feeds.
#[derive(Parser, Debug)]
#[command(name = "newsmorph", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feed URL or snapshot file. Repeatable; replaces the configured feeds.
    #[arg(long = "feed")]
    feeds: Vec<String>,

    /// File listing one feed per line.
    #[arg(long)]
    feeds_file: Option<PathBuf>,

    /// Embedding provider.
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,

    /// Embedding model.
    #[arg(long)]
    model: Option<String>,

    /// Embedding endpoint override.
    #[arg(long)]
    base_url: Option<String>,

    /// Directory for persisted embeddings.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Keep embeddings in memory for this run only.
    #[arg(long)]
    no_cache: bool,

    /// Embedding requests in flight at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Cap on the number of items compared.
    #[arg(long)]
    max_items: Option<usize>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ProviderArg {
    Ollama,
    Openai,
}

impl From<ProviderArg> for EmbeddingProviderType {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Ollama => EmbeddingProviderType::Ollama,
            ProviderArg::Openai => EmbeddingProviderType::OpenAI,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    let mut sources: Vec<Box<dyn FeedSource>> = Vec::with_capacity(config.feeds.len());
    for location in &config.feeds {
        match source_for(location, config.ingest.feed_timeout()) {
            Ok(source) => sources.push(source),
            Err(e) => warn!("Skipping feed {location}: {e}"),
        }
    }

    let engine = DigestEngine::from_config(&config)
        .await
        .context("failed to set up the embedding cache")?;
    info!(
        "Comparing {} feeds with model {}",
        sources.len(),
        engine.model()
    );

    let report = engine.run(&sources).await?;

    let rendered = match args.format {
        Format::Text => report.render_text(),
        Format::Json => report.to_json()?,
    };

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

/// Load the configuration file and apply command-line overrides.
fn resolve_config(args: &Args) -> Result<DigestConfig> {
    let mut config = match &args.config {
        Some(path) => DigestConfig::load(path)?,
        None => match DigestConfig::default_path().filter(|p| p.exists()) {
            Some(path) => {
                info!("Loaded configuration from {}", path.display());
                DigestConfig::load(&path)?
            }
            None => DigestConfig::default(),
        },
    };

    if !args.feeds.is_empty() || args.feeds_file.is_some() {
        config.feeds = args.feeds.clone();
    }
    if let Some(path) = &args.feeds_file {
        config.feeds.extend(load_feeds_file(path)?);
    }

    if let Some(provider) = args.provider {
        config.embedding.provider = provider.into();
    }
    if let Some(model) = &args.model {
        config.embedding.model = Some(model.clone());
    }
    if let Some(base_url) = &args.base_url {
        config.embedding.base_url = Some(base_url.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.dir = dir.clone();
    }
    if args.no_cache {
        config.cache.enabled = false;
    }
    if let Some(concurrency) = args.concurrency {
        config.ingest.concurrency = concurrency;
    }
    if args.max_items.is_some() {
        config.ingest.max_items = args.max_items;
    }

    Ok(config)
}
