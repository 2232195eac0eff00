//! mimir: semantic cache operator CLI
//!
//! Runs threshold sweeps against a labelled dataset and resolves single
//! queries through a persistent cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mimir::config::{HF_API_KEY_ENV, OPENAI_API_KEY_ENV, resolve_api_key};
use mimir::providers::{DefaultEmbedderFactory, OpenAiChatClient};
use mimir::{
    CacheQuery, CancelToken, Config, Dataset, EmbedderFactory, EmbeddingProviderKind,
    JsonFileStore, MemoryCacheStore, SemanticCache, Sweep, UpstreamClient,
};

/// Mimir semantic cache CLI
#[derive(Parser)]
#[command(name = "mimir")]
#[command(version = mimir::version::PKG_VERSION)]
#[command(about = "Semantic result cache for LLM queries")]
struct Args {
    /// Config file (default: ~/.mimir/config.toml, then /etc/mimir/config.toml)
    #[arg(short, long, env = "MIMIR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep embedders and thresholds over a labelled dataset
    Sweep {
        /// Two-column CSV (question, label) with a header row
        #[arg(short, long)]
        dataset: PathBuf,
        /// Thresholds to try, overriding the config file
        #[arg(short, long, value_delimiter = ',')]
        thresholds: Option<Vec<f32>>,
        /// Use only the first N rows
        #[arg(short, long)]
        limit: Option<usize>,
        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve one query through the cache
    Resolve {
        /// Task instruction
        #[arg(short, long)]
        query: String,
        /// Material the task is about
        #[arg(short = 'x', long)]
        context: String,
        /// System prompt sent upstream (not part of the cache key)
        #[arg(long)]
        system_prompt: Option<String>,
        /// JSON cache file, overriding `cache.store_path`
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Sweep {
            dataset,
            thresholds,
            limit,
            output,
        } => run_sweep(&config, &dataset, thresholds, limit, output.as_deref()).await?,
        Command::Resolve {
            query,
            context,
            system_prompt,
            store,
        } => {
            let mut query = CacheQuery::new(query, context);
            query.system_prompt = system_prompt;
            run_resolve(&config, &query, store).await?;
        }
        Command::Version => println!("mimir {}", mimir::version::version_string()),
    }

    Ok(())
}

async fn run_sweep(
    config: &Config,
    dataset_path: &Path,
    thresholds: Option<Vec<f32>>,
    limit: Option<usize>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut sweep_config = config.sweep_config();
    if let Some(thresholds) = thresholds {
        sweep_config = sweep_config.thresholds(thresholds);
    }
    let needs_remote = sweep_config
        .embedders
        .iter()
        .any(|spec| spec.provider == EmbeddingProviderKind::Remote);
    let sweep = Sweep::new(sweep_config)?;

    let dataset = Dataset::from_csv_path(dataset_path, limit.or(config.sweep.limit))?;
    let upstream = build_upstream(config)?;
    let factory = build_factory(config, needs_remote)?;

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling after the running configuration finishes...");
            on_signal.cancel();
        }
    });

    let report = sweep.run(&dataset, &upstream, &factory, &cancel).await?;
    print!("{report}");

    if let Some(path) = output {
        report.write_json(path)?;
        println!("report written to {}", path.display());
    }
    Ok(())
}

async fn run_resolve(
    config: &Config,
    query: &CacheQuery,
    store: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = config.embedding.to_spec();
    let factory = build_factory(config, spec.provider == EmbeddingProviderKind::Remote)?;
    let embedder = factory.create(&spec)?;
    let cache_config = config.cache.to_cache_config();

    let cache = match store.or_else(|| config.cache.store_path.clone()) {
        Some(path) => SemanticCache::open(embedder, cache_config, JsonFileStore::open(path)?)?,
        None => {
            let store = match config.cache.max_entries {
                Some(max) => MemoryCacheStore::with_max_entries(max),
                None => MemoryCacheStore::new(),
            };
            SemanticCache::open(embedder, cache_config, store)?
        }
    };

    let upstream = build_upstream(config)?;
    let resolution = cache.resolve(query, &upstream).await?;
    cache.flush().await?;

    println!("{}", resolution.response_text);
    match resolution.distance {
        Some(distance) if resolution.was_cache_hit => eprintln!(
            "cache hit (distance {distance:.4}, {} hits)",
            resolution.hit_count
        ),
        _ => eprintln!("cache miss (stored as {})", resolution.entry_key),
    }
    Ok(())
}

fn build_upstream(config: &Config) -> mimir::Result<UpstreamClient> {
    let upstream = &config.upstream;
    let key = resolve_api_key(upstream.api_key.as_deref(), OPENAI_API_KEY_ENV)?;
    let client = match &upstream.base_url {
        Some(url) => OpenAiChatClient::with_base_url(key, url)?,
        None => OpenAiChatClient::new(key)?,
    };
    Ok(UpstreamClient::new(
        Arc::new(client),
        &upstream.model,
        upstream.retry.to_policy()?,
    )?
    .temperature(upstream.temperature))
}

fn build_factory(config: &Config, needs_remote: bool) -> mimir::Result<DefaultEmbedderFactory> {
    let embedding = &config.embedding;
    let mut factory =
        DefaultEmbedderFactory::new().retry_policy(config.upstream.retry.to_policy()?);
    if needs_remote {
        factory = factory.huggingface_api_key(resolve_api_key(
            embedding.api_key.as_deref(),
            HF_API_KEY_ENV,
        )?);
    }
    if let Some(dimensions) = embedding.dimensions {
        factory = factory.remote_dimensions(dimensions);
    }
    if let Some(url) = &embedding.base_url {
        factory = factory.remote_base_url(url.as_str());
    }
    Ok(factory)
}
