//! Verdant: ecology literature ingestion and enrichment.
//! Entry point for the `verdant` binary.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use verdant_common::SandboxClient;
use verdant_db::{MemoryStore, PaperStore, PgPaperStore};
use verdant_ingestion::cache::ChunkedCache;
use verdant_ingestion::checkpoint::CheckpointStore;
use verdant_ingestion::enrichment::EnrichmentClient;
use verdant_ingestion::sources::crossref::CrossRefClient;
use verdant_ingestion::{Pipeline, PipelineConfig, PipelineStatus, ProcessWindow};
use verdant_llm::{AnthropicBackend, LlmBackend, OpenAiCompatibleBackend};

use config::{Config, LlmProvider};

#[derive(Parser)]
#[command(name = "verdant", version, about = "Bulk ingestion and metadata enrichment of ecology papers")]
struct Cli {
    /// Path to verdant.toml (defaults to $VERDANT_CONFIG, then ./verdant.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit newline-delimited JSON logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep the source and build the cached working set, finishing an
    /// interrupted sweep if one is on disk
    Collect {
        /// Discard the existing cache and checkpoint first
        #[arg(long)]
        fresh: bool,
        /// Stop once this many unique records are held
        #[arg(long)]
        target: Option<usize>,
    },
    /// Enrich and persist the cached working set, resuming from the checkpoint
    Process {
        /// First record index; overrides the checkpoint
        #[arg(long)]
        start: Option<usize>,
        /// Process at most this many records
        #[arg(long)]
        limit: Option<usize>,
        /// Persist to an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Collect then process in one invocation
    Run {
        #[arg(long)]
        fresh: bool,
        #[arg(long)]
        target: Option<usize>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show cached working set and checkpoint
    Status,
    /// Delete the checkpoint, cached chunks and collection manifest
    Reset,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("verdant=debug,info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_llm_backend(config: &Config) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let llm = &config.llm;
    let client = SandboxClient::with_timeout(Duration::from_secs(llm.timeout_secs))?;

    let backend: Arc<dyn LlmBackend> = match llm.provider {
        LlmProvider::Anthropic => {
            let key = llm.api_key().with_context(|| {
                format!("Anthropic API key not found (set {})", llm.key_env())
            })?;
            let backend = AnthropicBackend::new(client, key, llm.model.clone());
            match &llm.base_url {
                Some(url) => Arc::new(backend.with_base_url(url.clone())),
                None => Arc::new(backend),
            }
        }
        LlmProvider::Openai => {
            let base_url = llm.base_url.clone().context("llm.base_url is required for the openai provider")?;
            let key = llm.api_key();
            if key.is_none() {
                warn!(env = llm.key_env(), "No API key for OpenAI-compatible backend, sending unauthenticated requests");
            }
            Arc::new(OpenAiCompatibleBackend::new(client, base_url, llm.model.clone(), key))
        }
    };
    Ok(backend)
}

async fn build_store(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn PaperStore>> {
    if dry_run {
        info!("Dry run: persisting to an in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let url = config
        .database_url()
        .with_context(|| format!("Database URL not found (set {})", config.database.url_env))?;
    info!("Connecting to PostgreSQL...");
    let store = PgPaperStore::connect(url.expose_secret(), config.database.max_connections).await?;
    store.migrate().await?;
    info!("PostgreSQL connected, migrations applied.");
    Ok(Arc::new(store))
}

/// Credentials are checked for every pipeline command, so a two-phase run
/// fails before a long sweep rather than after it.
async fn build_pipeline(
    config: &Config,
    target: Option<usize>,
    with_store: bool,
    dry_run: bool,
) -> anyhow::Result<Pipeline> {
    let mut pipeline_config = config.pipeline_config();
    if target.is_some() {
        pipeline_config.target = target;
    }

    let source = CrossRefClient::new(config.source.mailto.clone(), Duration::from_secs(config.source.timeout_secs))?
        .with_base_url(config.source.base_url.clone());
    let enricher = EnrichmentClient::new(build_llm_backend(config)?)
        .with_max_tokens(config.llm.max_tokens)
        .with_timeout(Duration::from_secs(config.llm.timeout_secs));
    info!(provider = ?config.llm.provider, model = enricher.model_id(), "Enrichment backend ready");
    let store: Arc<dyn PaperStore> = if with_store {
        build_store(config, dry_run).await?
    } else {
        Arc::new(MemoryStore::new())
    };

    Ok(Pipeline::new(pipeline_config, Arc::new(source), Arc::new(enricher), store))
}

fn working_set(pc: &PipelineConfig) -> (ChunkedCache, CheckpointStore) {
    (ChunkedCache::new(&pc.cache_dir, pc.chunk_size), CheckpointStore::new(&pc.cache_dir))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    info!("Verdant {} starting", env!("CARGO_PKG_VERSION"));
    let config = Config::load(cli.config.as_deref())?;
    info!(
        mode = ?config.pipeline.mode,
        categories = config.queries.len(),
        authors = config.authors.len(),
        "Configuration loaded"
    );

    match cli.command {
        Command::Collect { fresh, target } => {
            let mut pipeline = build_pipeline(&config, target, false, false).await?;
            let stats = pipeline.collect(fresh).await?;
            println!("Collected {} records ({} pages, {} source errors)", stats.collected, stats.pages_fetched, stats.source_errors);
            println!("Run `verdant process` to enrich and persist them.");
        }
        Command::Process { start, limit, dry_run } => {
            let mut pipeline = build_pipeline(&config, None, true, dry_run).await?;
            let summary = pipeline.process(ProcessWindow { start, limit }).await?;
            println!("{summary}");
        }
        Command::Run { fresh, target, dry_run } => {
            let mut pipeline = build_pipeline(&config, target, true, dry_run).await?;
            if config.pipeline.two_phase {
                let stats = pipeline.collect(fresh).await?;
                println!("Collected {} records. Two-phase mode: run `verdant process` next.", stats.collected);
            } else {
                let summary = pipeline.run(fresh).await?;
                println!("{summary}");
            }
        }
        Command::Status => {
            let (cache, checkpoints) = working_set(&config.pipeline_config());
            println!("{}", PipelineStatus::read(&cache, &checkpoints)?);
        }
        Command::Reset => {
            let (cache, checkpoints) = working_set(&config.pipeline_config());
            checkpoints.clear(&cache)?;
            info!(dir = %cache.dir().display(), "Checkpoint and collected working set removed");
        }
    }

    Ok(())
}
