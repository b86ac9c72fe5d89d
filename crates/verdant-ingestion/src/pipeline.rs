//! Run controller for the two-phase ingestion pipeline.
//!
//! Orchestrates one run:
//!   1. Build the query plan from categories, authors and the date mode
//!   2. Sweep the source into a `CollectionSession`, flushing chunks per group
//!   3. Reload the working set and resolve the processing window
//!   4. Per record: abstract check, store pre-check, pre-filter, enrichment,
//!      transactional persist
//!   5. Checkpoint every `checkpoint_interval` records, flushing the error log
//!   6. Return a `RunSummary`
//!
//! The checkpoint marks a covered prefix: records `[0, processedCount)` have
//! been attempted. Only a window that starts at the end of that prefix moves
//! it, and the working set is cleared only once the prefix reaches the end.
//!
//! Backfill and incremental jobs are the same pipeline with a different
//! `QueryMode`. Per-record failures are counted and skipped; only errors for
//! which `VerdantError::is_infrastructure` holds end the run in `Failed`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use verdant_common::{Result, VerdantError};
use verdant_db::{DbError, PaperStore, PersistOutcome};
use verdant_llm::TokenPricing;

use crate::cache::{ChunkedCache, CollectionManifest};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::collector::{CollectorConfig, QueryGroup, SourceCollector};
use crate::dedup::CollectionSession;
use crate::enrichment::{EnrichmentClient, TokenUsage};
use crate::models::CandidateRecord;
use crate::prefilter;
use crate::repository::IngestionRepository;
use crate::sources::{DateFilter, LiteratureSource, QueryField, SearchQuery};
use crate::stats::{ErrorLog, RecordOutcome, RunStats};

// ── Run config ────────────────────────────────────────────────────────────────

/// Which slice of the literature a run sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueryMode {
    /// One-time historical sweep by publication year.
    Backfill { from_year: i32, until_year: i32 },
    /// Recurring sweep of whatever the source indexed recently.
    Incremental { days_back: u32 },
}

impl QueryMode {
    pub fn date_filter(&self, today: NaiveDate) -> Option<DateFilter> {
        match *self {
            QueryMode::Backfill { from_year, until_year } => Some(DateFilter::Published {
                from: NaiveDate::from_ymd_opt(from_year, 1, 1)?,
                until: NaiveDate::from_ymd_opt(until_year, 12, 31)?,
            }),
            QueryMode::Incremental { days_back } => {
                Some(DateFilter::IndexedSince(today.checked_sub_days(Days::new(days_back as u64))?))
            }
        }
    }
}

/// A named category of keyword queries, flushed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCategory {
    pub name: String,
    pub queries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: QueryMode,
    pub categories: Vec<QueryCategory>,
    pub authors: Vec<String>,
    pub target: Option<usize>,
    pub page_size: usize,
    pub max_pages_per_query: usize,
    pub request_delay: Duration,
    /// Concurrent enrichment calls per wave.
    pub wave_size: usize,
    pub wave_delay: Duration,
    pub checkpoint_interval: usize,
    pub chunk_size: usize,
    /// Abstracts shorter than this (trimmed, in characters) are not enriched.
    pub min_abstract_len: usize,
    pub prefilter: bool,
    pub cache_dir: PathBuf,
    pub errors_dir: PathBuf,
    pub pricing: TokenPricing,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: QueryMode::Incremental { days_back: 7 },
            categories: Vec::new(),
            authors: Vec::new(),
            target: None,
            page_size: 100,
            max_pages_per_query: 50,
            request_delay: Duration::from_millis(1_000),
            wave_size: 2,
            wave_delay: Duration::from_secs(3),
            checkpoint_interval: 50,
            chunk_size: 10_000,
            min_abstract_len: 100,
            prefilter: true,
            cache_dir: PathBuf::from("cache"),
            errors_dir: PathBuf::from("errors"),
            pricing: TokenPricing::default(),
        }
    }
}

/// Expand categories and authors into query groups, in declaration order.
/// Each author is its own group so the cache is flushed after every author.
pub fn build_plan(config: &PipelineConfig, today: NaiveDate) -> Vec<QueryGroup> {
    let filter = config.mode.date_filter(today);
    let query = |text: &str, field| SearchQuery { text: text.to_string(), field, filter };

    let categories = config.categories.iter().map(|c| QueryGroup {
        name: c.name.clone(),
        queries: c.queries.iter().map(|q| query(q, QueryField::Keyword)).collect(),
    });
    let authors = config.authors.iter().map(|a| QueryGroup {
        name: format!("author: {a}"),
        queries: vec![query(a, QueryField::Author)],
    });
    categories.chain(authors).collect()
}

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Collecting,
    Collected,
    Processing,
    Completed,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Collecting)
                | (Idle, Collected)          // working set already cached
                | (Collecting, Collected)
                | (Collected, Processing)
                | (Processing, Processing)   // resume at a non-zero offset
                | (Processing, Completed)
                | (Collecting, Failed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Collecting => "collecting",
            RunState::Collected => "collected",
            RunState::Processing => "processing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Slice of the working set to process. Both fields `None` means "resume
/// from the checkpoint, or start at 0, and run to the end".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessWindow {
    pub start: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub state: RunState,
    pub total: usize,
    pub start: usize,
    pub end: usize,
    pub resumed_from: Option<usize>,
    pub stats: RunStats,
    pub elapsed: Duration,
    pub error_log: Option<PathBuf>,
}

impl RunSummary {
    pub fn log(&self) {
        let s = &self.stats;
        info!(
            state = %self.state,
            window_start = self.start,
            window_end = self.end,
            total = self.total,
            attempted = s.attempted,
            inserted = s.inserted,
            duplicates = s.duplicates,
            prefiltered = s.prefiltered,
            no_abstract = s.no_abstract,
            enrichment_errors = s.enrichment_errors,
            persist_errors = s.persist_errors,
            cost_usd = s.estimated_cost_usd,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Run finished"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "=== Run summary ({}) ===", self.state)?;
        write!(f, "Window:             {}..{} of {}", self.start, self.end, self.total)?;
        match self.resumed_from {
            Some(k) => writeln!(f, " (resumed at {k})")?,
            None => writeln!(f)?,
        }
        writeln!(f, "Collected:          {}", s.collected)?;
        writeln!(f, "Pages fetched:      {}", s.pages_fetched)?;
        writeln!(f, "Source errors:      {}", s.source_errors)?;
        writeln!(f, "Attempted:          {}", s.attempted)?;
        writeln!(f, "Inserted:           {}", s.inserted)?;
        writeln!(f, "Duplicates:         {}", s.duplicates)?;
        writeln!(f, "Pre-filtered:       {}", s.prefiltered)?;
        writeln!(f, "No abstract:        {}", s.no_abstract)?;
        writeln!(f, "Enrichment errors:  {}", s.enrichment_errors)?;
        writeln!(f, "Persist errors:     {}", s.persist_errors)?;
        writeln!(f, "Enrichment calls:   {}", s.enrichment_calls)?;
        writeln!(f, "Tokens (in/out):    {}/{}", s.prompt_tokens, s.completion_tokens)?;
        writeln!(f, "Estimated cost:     ${:.4}", s.estimated_cost_usd)?;
        write!(f, "Elapsed:            {:.1}s", self.elapsed.as_secs_f64())?;
        if let Some(path) = &self.error_log {
            write!(f, "\nError log:          {}", path.display())?;
        }
        Ok(())
    }
}

/// Read-only view of the on-disk run state.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub cached_records: usize,
    pub chunks: usize,
    pub collection: Option<CollectionManifest>,
    pub checkpoint: Option<Checkpoint>,
}

impl PipelineStatus {
    /// Inspect a cache directory without building a full pipeline.
    pub fn read(cache: &ChunkedCache, checkpoints: &CheckpointStore) -> Result<Self> {
        let lengths = cache.chunk_lengths()?;
        Ok(Self {
            cached_records: lengths.iter().sum(),
            chunks: lengths.len(),
            collection: cache.load_manifest()?,
            checkpoint: checkpoints.load()?,
        })
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cached records:     {} in {} chunk(s)", self.cached_records, self.chunks)?;
        match &self.collection {
            Some(m) => writeln!(
                f,
                "Collection:         {} after {} group(s), {} source error(s)",
                if m.complete { "complete" } else { "interrupted" },
                m.completed_groups.len(),
                m.stats.source_errors
            )?,
            None => writeln!(f, "Collection:         none")?,
        }
        match &self.checkpoint {
            Some(cp) => write!(
                f,
                "Checkpoint:         {}/{} processed at {} ({} inserted, ${:.4})",
                cp.processed_count,
                cp.total_count,
                cp.timestamp.to_rfc3339(),
                cp.stats.inserted,
                cp.stats.estimated_cost_usd
            ),
            None => write!(f, "Checkpoint:         none"),
        }
    }
}

/// Result of one record: its outcome and any tokens spent on it.
struct Processed {
    outcome: RecordOutcome,
    usage: Option<TokenUsage>,
}

impl Processed {
    fn skipped(outcome: RecordOutcome) -> Self {
        Self { outcome, usage: None }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn LiteratureSource>,
    enricher: Arc<EnrichmentClient>,
    repo: IngestionRepository,
    cache: ChunkedCache,
    checkpoints: CheckpointStore,
    state: RunState,
    history: Vec<RunState>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn LiteratureSource>,
        enricher: Arc<EnrichmentClient>,
        store: Arc<dyn PaperStore>,
    ) -> Self {
        let cache = ChunkedCache::new(&config.cache_dir, config.chunk_size);
        let checkpoints = CheckpointStore::new(&config.cache_dir);
        Self {
            config,
            source,
            enricher,
            repo: IngestionRepository::new(store),
            cache,
            checkpoints,
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState { self.state }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[RunState] { &self.history }

    pub fn cache(&self) -> &ChunkedCache { &self.cache }

    pub fn checkpoints(&self) -> &CheckpointStore { &self.checkpoints }

    fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(VerdantError::Pipeline(format!("illegal transition {} -> {}", self.state, next)));
        }
        info!(from = %self.state, to = %next, "Run state");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self, err: &VerdantError) {
        error!(state = %self.state, error = %err, "Run failed");
        self.state = RunState::Failed;
        self.history.push(RunState::Failed);
    }

    // ── Collection phase ────────────────────────────────────────────────────

    /// Build the working set. A finished collection is reused and an
    /// interrupted one resumes at its next unflushed group. With `fresh`,
    /// checkpoint, chunks and manifest are discarded first.
    pub async fn collect(&mut self, fresh: bool) -> Result<RunStats> {
        if fresh {
            self.checkpoints.clear(&self.cache)?;
        }
        let manifest = self.cache.load_manifest()?;
        if let Some(m) = manifest.as_ref().filter(|m| m.complete) {
            info!(cached = m.records, groups = m.completed_groups.len(), "Reusing collected working set");
            self.transition(RunState::Collected)?;
            return Ok(m.stats.clone());
        }

        self.transition(RunState::Collecting)?;
        match self.sweep(manifest).await {
            Ok(stats) => {
                self.transition(RunState::Collected)?;
                Ok(stats)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn sweep(&self, manifest: Option<CollectionManifest>) -> Result<RunStats> {
        let (mut session, mut manifest) = match manifest {
            Some(m) => {
                info!(groups_done = m.completed_groups.len(), records = m.records, "Resuming interrupted collection");
                (CollectionSession::from_records(self.cache.load()?), m)
            }
            None if self.cache.exists()? => {
                warn!("Cached chunks have no collection manifest, sweeping every group again");
                (CollectionSession::from_records(self.cache.load()?), CollectionManifest::default())
            }
            None => (CollectionSession::new(), CollectionManifest::default()),
        };

        let groups = build_plan(&self.config, Utc::now().date_naive());
        let collector = SourceCollector::new(
            self.source.clone(),
            CollectorConfig {
                target: self.config.target,
                page_size: self.config.page_size,
                max_pages_per_query: self.config.max_pages_per_query,
                request_delay: self.config.request_delay,
            },
        );
        collector.collect(&groups, &mut session, &self.cache, &mut manifest).await?;
        Ok(manifest.stats)
    }

    // ── Processing phase ────────────────────────────────────────────────────

    /// Process `window` of the collected working set.
    pub async fn process(&mut self, window: ProcessWindow) -> Result<RunSummary> {
        let started = Instant::now();
        let started_at = Utc::now();

        if self.state == RunState::Idle {
            match self.cache.load_manifest()? {
                Some(m) if m.complete => {}
                Some(m) => {
                    return Err(VerdantError::Pipeline(format!(
                        "collection interrupted after {} group(s), run collect to finish it",
                        m.completed_groups.len()
                    )))
                }
                None if self.cache.exists()? => {
                    return Err(VerdantError::Pipeline(
                        "cached chunks have no collection manifest, run collect to finish the sweep".into(),
                    ))
                }
                None => return Err(VerdantError::Pipeline("no collected working set, run collect first".into())),
            }
            self.transition(RunState::Collected)?;
        }
        self.transition(RunState::Processing)?;

        let mut log = ErrorLog::new(&self.config.errors_dir, started_at);
        match self.process_window(window, &mut log).await {
            Ok(mut summary) => {
                self.transition(RunState::Completed)?;
                summary.state = self.state;
                summary.error_log = flush_log(&mut log);
                summary.elapsed = started.elapsed();
                summary.log();
                Ok(summary)
            }
            Err(e) => {
                self.fail(&e);
                log.note_run("fatal", e.to_string());
                flush_log(&mut log);
                Err(e)
            }
        }
    }

    async fn process_window(&mut self, window: ProcessWindow, log: &mut ErrorLog) -> Result<RunSummary> {
        let records = self.cache.load()?;
        let total = records.len();
        let collection = self.cache.load_manifest()?.unwrap_or_default();

        let checkpoint = match self.checkpoints.load()? {
            Some(cp) if cp.resume_offset(total).is_none() => {
                warn!(checkpoint_total = cp.total_count, total, "Checkpoint does not match working set, ignoring it");
                None
            }
            cp => cp,
        };
        let covered = checkpoint.as_ref().map_or(0, |cp| cp.processed_count);
        let start = window.start.unwrap_or(covered).min(total);
        let end = window.limit.map_or(total, |limit| start.saturating_add(limit).min(total));
        // Only a window continuing the covered prefix may move the checkpoint.
        let extends = start == covered;

        let mut stats = match checkpoint.filter(|_| extends) {
            Some(cp) => cp.stats,
            None => {
                let mut stats = RunStats::default();
                stats.absorb_collection(&collection.stats);
                if start == 0 {
                    for failure in &collection.source_failures {
                        log.note_run("source_error", failure.clone());
                    }
                }
                stats
            }
        };
        stats.collected = total;

        let resumed_from = (window.start.is_none() && start > 0).then_some(start);
        if let Some(offset) = resumed_from {
            info!(offset, total, "Resuming from checkpoint");
            self.transition(RunState::Processing)?;
        }
        if !extends {
            info!(covered, start, end, "Window is outside the checkpointed prefix, checkpoint left as is");
        }
        info!(start, end, total, wave_size = self.config.wave_size, "Processing window");

        let wave_size = self.config.wave_size.max(1);
        let interval = self.config.checkpoint_interval.max(1);
        let mut last_saved = start;
        let mut pos = start;

        while pos < end {
            let wave_end = (pos + wave_size).min(end);
            let wave = &records[pos..wave_end];
            let results = join_all(wave.iter().map(|r| self.process_record(r))).await;

            let mut wave_calls = 0;
            for (record, result) in wave.iter().zip(results) {
                let processed = result?;
                if let Some(usage) = processed.usage {
                    wave_calls += 1;
                    let cost = self.config.pricing.cost_usd(usage.prompt_tokens, usage.completion_tokens);
                    stats.add_usage(usage, cost);
                }
                stats.record(&processed.outcome);
                log.note(record, &processed.outcome);
            }
            pos = wave_end;

            if extends && pos - last_saved >= interval {
                self.checkpoints.save(pos, total, &stats)?;
                last_saved = pos;
                flush_log(log);
            }
            if wave_calls > 0 && pos < end {
                tokio::time::sleep(self.config.wave_delay).await;
            }
        }

        if extends && end == total {
            self.checkpoints.clear(&self.cache)?;
        } else if extends {
            self.checkpoints.save(end, total, &stats)?;
        }

        Ok(RunSummary {
            state: self.state,
            total,
            start,
            end,
            resumed_from,
            stats,
            elapsed: Duration::ZERO,
            error_log: None,
        })
    }

    /// Run one record through the gates, enrichment and persistence.
    ///
    /// Returns `Err` only for infrastructure failures, which end the run.
    async fn process_record(&self, record: &CandidateRecord) -> Result<Processed> {
        let doi = record.external_id.as_str();

        if record.abstract_len() < self.config.min_abstract_len {
            debug!(doi, len = record.abstract_len(), "Abstract too short, skipped");
            return Ok(Processed::skipped(RecordOutcome::NoAbstract));
        }

        match self.repo.exists(doi).await.map_err(store_error) {
            Ok(false) => {}
            Ok(true) => {
                debug!(doi, "Already stored, skipped");
                return Ok(Processed::skipped(RecordOutcome::Duplicate));
            }
            Err(e) if !e.is_infrastructure() => {
                warn!(doi, error = %e, "Store rejected lookup");
                return Ok(Processed::skipped(RecordOutcome::PersistFailed { error: e.to_string() }));
            }
            Err(e) => return Err(e),
        }

        if self.config.prefilter {
            if let Some(rule) = prefilter::matched_rule(record) {
                debug!(doi, rule, "Pre-filtered");
                return Ok(Processed::skipped(RecordOutcome::Prefiltered { rule }));
            }
        }

        let enrichment = match self.enricher.enrich(record).await {
            Ok(e) => e,
            Err(e) => {
                warn!(doi, title = %record.title, error = %e, "Enrichment failed");
                return Ok(Processed {
                    usage: e.usage(),
                    outcome: RecordOutcome::EnrichmentFailed { error: e.to_string() },
                });
            }
        };

        let outcome = match self.repo.persist(record, &enrichment.metadata).await.map_err(store_error) {
            Ok(PersistOutcome::Inserted(_)) => RecordOutcome::Inserted,
            Ok(PersistOutcome::Duplicate) => RecordOutcome::Duplicate,
            Err(e) if !e.is_infrastructure() => {
                warn!(doi, error = %e, "Persist rejected, rolled back");
                RecordOutcome::PersistFailed { error: e.to_string() }
            }
            Err(e) => return Err(e),
        };
        Ok(Processed { outcome, usage: Some(enrichment.usage) })
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// Collect, then process the whole working set in one invocation.
    pub async fn run(&mut self, fresh: bool) -> Result<RunSummary> {
        self.collect(fresh).await?;
        self.process(ProcessWindow::default()).await
    }

    pub fn status(&self) -> Result<PipelineStatus> {
        PipelineStatus::read(&self.cache, &self.checkpoints)
    }

    /// Discard checkpoint and cached working set so the next run starts fresh.
    pub fn reset(&mut self) -> Result<()> {
        self.checkpoints.clear(&self.cache)?;
        self.state = RunState::Idle;
        self.history.push(RunState::Idle);
        Ok(())
    }
}

/// A row the store refused is the record's problem; anything else is the store's.
fn store_error(err: DbError) -> VerdantError {
    if err.is_constraint() {
        VerdantError::Rejected(err.to_string())
    } else {
        VerdantError::Store(err.to_string())
    }
}

/// Write out the error log, keeping the run going if that fails.
fn flush_log(log: &mut ErrorLog) -> Option<PathBuf> {
    log.flush().unwrap_or_else(|e| {
        warn!(error = %e, "Could not write error log");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_backfill_filter_spans_whole_years() {
        let mode = QueryMode::Backfill { from_year: 1995, until_year: 2005 };
        assert_eq!(
            mode.date_filter(day(2026, 1, 1)),
            Some(DateFilter::Published { from: day(1995, 1, 1), until: day(2005, 12, 31) })
        );
    }

    #[test]
    fn test_incremental_filter_counts_back_from_today() {
        let mode = QueryMode::Incremental { days_back: 7 };
        assert_eq!(mode.date_filter(day(2026, 3, 3)), Some(DateFilter::IndexedSince(day(2026, 2, 24))));
    }

    #[test]
    fn test_plan_orders_categories_then_authors() {
        let config = PipelineConfig {
            categories: vec![
                QueryCategory { name: "marine".into(), queries: vec!["coral reef".into(), "kelp forest".into()] },
                QueryCategory { name: "freshwater".into(), queries: vec!["river restoration".into()] },
            ],
            authors: vec!["Sandra Díaz".into()],
            ..Default::default()
        };
        let plan = build_plan(&config, day(2026, 1, 1));
        let names: Vec<_> = plan.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["marine", "freshwater", "author: Sandra Díaz"]);
        assert_eq!(plan[0].queries.len(), 2);
        assert_eq!(plan[2].queries[0].field, QueryField::Author);
        assert!(plan.iter().flat_map(|g| &g.queries).all(|q| q.filter.is_some()));
    }

    #[test]
    fn test_state_transitions() {
        use RunState::*;
        assert!(Idle.can_transition_to(Collecting));
        assert!(Idle.can_transition_to(Collected));
        assert!(Processing.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Failed));
        assert!(Collecting.can_transition_to(Failed));
        assert!(!Collected.can_transition_to(Failed));
        assert!(!Idle.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_store_errors_split_by_cause() {
        let rejected = store_error(DbError::Constraint { table: "papers", message: "invalid byte sequence".into() });
        assert!(matches!(rejected, VerdantError::Rejected(_)));
        assert!(!rejected.is_infrastructure());

        let down = store_error(DbError::Postgres(sqlx::Error::PoolTimedOut));
        assert!(down.is_infrastructure());
    }

    #[test]
    fn test_query_mode_toml_shape() {
        let mode: QueryMode = serde_json::from_value(serde_json::json!({
            "mode": "backfill", "from_year": 2000, "until_year": 2010
        }))
        .unwrap();
        assert_eq!(mode, QueryMode::Backfill { from_year: 2000, until_year: 2010 });
    }
}
