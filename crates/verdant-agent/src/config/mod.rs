//! Configuration loading for Verdant.
//! Reads verdant.toml from the current directory or the path in VERDANT_CONFIG.
//! Secrets never live in the file: the database URL and API keys are read
//! from the environment (a `.env` file is loaded first by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use verdant_ingestion::sources::crossref::CR_API_BASE;
use verdant_ingestion::{PipelineConfig, QueryCategory, QueryMode};
use verdant_llm::TokenPricing;

mod tests;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    /// Keyword categories, swept in declaration order.
    #[serde(default)]
    pub queries: Vec<QueryCategory>,
    /// Author names, each swept as its own group after the categories.
    #[serde(default)]
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Environment variable holding the connection URL.
    #[serde(default = "default_database_url_env")]
    pub url_env: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url_env() -> String { "DATABASE_URL".to_string() }
fn default_max_connections()  -> u32 { 5 }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url_env: default_database_url_env(), max_connections: default_max_connections() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_base_url")]
    pub base_url: String,
    /// Contact address sent with every request (CrossRef polite pool).
    #[serde(default = "default_mailto")]
    pub mailto: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages_per_query: usize,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

fn default_source_base_url()  -> String { CR_API_BASE.to_string() }
fn default_mailto()           -> String { "verdant@example.org".to_string() }
fn default_page_size()        -> usize { 100 }
fn default_max_pages()        -> usize { 50 }
fn default_request_delay_ms() -> u64 { 1_000 }
fn default_source_timeout()   -> u64 { 30 }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            mailto: default_mailto(),
            page_size: default_page_size(),
            max_pages_per_query: default_max_pages(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_source_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Anthropic,
    /// Any server speaking the OpenAI chat-completions dialect.
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    /// Required for `openai`; overrides the public endpoint for `anthropic`.
    pub base_url: Option<String>,
    /// Environment variable holding the API key. Defaults per provider.
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_input_price")]
    pub input_usd_per_mtok: f64,
    #[serde(default = "default_output_price")]
    pub output_usd_per_mtok: f64,
}

fn default_provider()     -> LlmProvider { LlmProvider::Anthropic }
fn default_model()        -> String { "claude-3-5-haiku-latest".to_string() }
fn default_max_tokens()   -> u32 { 1024 }
fn default_llm_timeout()  -> u64 { 60 }
fn default_input_price()  -> f64 { TokenPricing::default().input_per_mtok }
fn default_output_price() -> f64 { TokenPricing::default().output_per_mtok }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
            input_usd_per_mtok: default_input_price(),
            output_usd_per_mtok: default_output_price(),
        }
    }
}

impl LlmConfig {
    pub fn key_env(&self) -> &str {
        match (&self.api_key_env, self.provider) {
            (Some(name), _) => name,
            (None, LlmProvider::Anthropic) => "ANTHROPIC_API_KEY",
            (None, LlmProvider::Openai) => "OPENAI_API_KEY",
        }
    }

    pub fn api_key(&self) -> Option<SecretString> {
        secret_from_env(self.key_env())
    }

    pub fn pricing(&self) -> TokenPricing {
        TokenPricing { input_per_mtok: self.input_usd_per_mtok, output_per_mtok: self.output_usd_per_mtok }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_mode")]
    pub mode: QueryMode,
    /// Stop collecting once this many unique records are held.
    pub target: Option<usize>,
    #[serde(default = "default_wave_size")]
    pub wave_size: usize,
    #[serde(default = "default_wave_delay_ms")]
    pub wave_delay_ms: u64,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_min_abstract_len")]
    pub min_abstract_len: usize,
    #[serde(default = "default_true")]
    pub prefilter: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_errors_dir")]
    pub errors_dir: PathBuf,
    /// When set, `run` stops after collection; processing is started
    /// separately with `process`.
    #[serde(default)]
    pub two_phase: bool,
}

fn default_mode()                -> QueryMode { QueryMode::Incremental { days_back: 7 } }
fn default_wave_size()           -> usize { 2 }
fn default_wave_delay_ms()       -> u64 { 3_000 }
fn default_checkpoint_interval() -> usize { 50 }
fn default_chunk_size()          -> usize { 10_000 }
fn default_min_abstract_len()    -> usize { 100 }
fn default_true()                -> bool { true }
fn default_cache_dir()           -> PathBuf { PathBuf::from("cache") }
fn default_errors_dir()          -> PathBuf { PathBuf::from("errors") }

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            target: None,
            wave_size: default_wave_size(),
            wave_delay_ms: default_wave_delay_ms(),
            checkpoint_interval: default_checkpoint_interval(),
            chunk_size: default_chunk_size(),
            min_abstract_len: default_min_abstract_len(),
            prefilter: true,
            cache_dir: default_cache_dir(),
            errors_dir: default_errors_dir(),
            two_phase: false,
        }
    }
}

fn secret_from_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

impl Config {
    /// Load from `path`, else `VERDANT_CONFIG`, else `./verdant.toml`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("VERDANT_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("verdant.toml")),
        };

        if !path.exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy verdant.example.toml to verdant.toml and edit it.",
                path.display()
            );
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.pipeline;
        if self.source.page_size == 0 || self.source.max_pages_per_query == 0 {
            anyhow::bail!("source.page_size and source.max_pages_per_query must be positive");
        }
        if p.wave_size == 0 || p.checkpoint_interval == 0 || p.chunk_size == 0 {
            anyhow::bail!("pipeline.wave_size, checkpoint_interval and chunk_size must be positive");
        }
        if let QueryMode::Backfill { from_year, until_year } = p.mode {
            if from_year > until_year {
                anyhow::bail!("backfill from_year {from_year} is after until_year {until_year}");
            }
        }
        if self.llm.provider == LlmProvider::Openai && self.llm.base_url.is_none() {
            anyhow::bail!("llm.base_url is required for the openai provider");
        }
        if self.queries.iter().all(|c| c.queries.is_empty()) && self.authors.is_empty() {
            anyhow::bail!("no queries or authors configured");
        }
        Ok(())
    }

    pub fn database_url(&self) -> Option<SecretString> {
        secret_from_env(&self.database.url_env)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let p = &self.pipeline;
        PipelineConfig {
            mode: p.mode,
            categories: self.queries.clone(),
            authors: self.authors.clone(),
            target: p.target,
            page_size: self.source.page_size,
            max_pages_per_query: self.source.max_pages_per_query,
            request_delay: Duration::from_millis(self.source.request_delay_ms),
            wave_size: p.wave_size,
            wave_delay: Duration::from_millis(p.wave_delay_ms),
            checkpoint_interval: p.checkpoint_interval,
            chunk_size: p.chunk_size,
            min_abstract_len: p.min_abstract_len,
            prefilter: p.prefilter,
            cache_dir: p.cache_dir.clone(),
            errors_dir: p.errors_dir.clone(),
            pricing: self.llm.pricing(),
        }
    }
}
