//! Run statistics, per-record outcomes and the failure log.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use verdant_common::Result;

use crate::cache::write_atomic;
use crate::enrichment::TokenUsage;
use crate::models::CandidateRecord;

/// How a single record left the processing phase.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Inserted,
    /// Already in the store, found either by the pre-check or by the
    /// uniqueness constraint at insert time.
    Duplicate,
    NoAbstract,
    Prefiltered { rule: &'static str },
    EnrichmentFailed { error: String },
    PersistFailed { error: String },
}

impl RecordOutcome {
    pub fn reason(&self) -> &'static str {
        match self {
            RecordOutcome::Inserted => "inserted",
            RecordOutcome::Duplicate => "duplicate",
            RecordOutcome::NoAbstract => "no_abstract",
            RecordOutcome::Prefiltered { .. } => "prefiltered",
            RecordOutcome::EnrichmentFailed { .. } => "enrichment_error",
            RecordOutcome::PersistFailed { .. } => "persist_error",
        }
    }

    /// Detail worth writing to the failure log, if this outcome belongs there.
    fn log_detail(&self) -> Option<String> {
        match self {
            RecordOutcome::Prefiltered { rule } => Some(format!("matched exclusion rule '{rule}'")),
            RecordOutcome::EnrichmentFailed { error } | RecordOutcome::PersistFailed { error } => {
                Some(error.clone())
            }
            _ => None,
        }
    }
}

/// Counters for one run. Serialized into every checkpoint so a resumed run
/// reports totals for the whole window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStats {
    // collection
    pub collected: usize,
    pub pages_fetched: usize,
    pub source_errors: usize,
    pub skipped_no_key: usize,
    pub skipped_empty_abstract: usize,
    // processing
    pub attempted: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub no_abstract: usize,
    pub prefiltered: usize,
    pub enrichment_errors: usize,
    pub persist_errors: usize,
    pub enrichment_calls: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl RunStats {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.attempted += 1;
        match outcome {
            RecordOutcome::Inserted => self.inserted += 1,
            RecordOutcome::Duplicate => self.duplicates += 1,
            RecordOutcome::NoAbstract => self.no_abstract += 1,
            RecordOutcome::Prefiltered { .. } => self.prefiltered += 1,
            RecordOutcome::EnrichmentFailed { .. } => self.enrichment_errors += 1,
            RecordOutcome::PersistFailed { .. } => self.persist_errors += 1,
        }
    }

    pub fn add_usage(&mut self, usage: TokenUsage, cost_usd: f64) {
        self.enrichment_calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.estimated_cost_usd += cost_usd;
    }

    /// Fold collection-phase counters into a processing-phase snapshot.
    pub fn absorb_collection(&mut self, other: &RunStats) {
        self.pages_fetched += other.pages_fetched;
        self.source_errors += other.source_errors;
        self.skipped_no_key += other.skipped_no_key;
        self.skipped_empty_abstract += other.skipped_empty_abstract;
    }
}

// ── Failure log ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    #[serde(rename = "doi")]
    pub external_id: String,
    pub title: String,
    pub reason: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Records that were skipped for a reason an operator may want to review:
/// pre-filter rejections, enrichment failures, persistence failures and
/// source outages.
///
/// Entries are held in memory and written out by `flush`, which the run
/// controller calls at every checkpoint and at the end of the run. The file
/// is `run-<started_at>.json` under `dir`, with a numeric suffix when a log
/// for the same millisecond already exists.
#[derive(Debug)]
pub struct ErrorLog {
    dir: PathBuf,
    started_at: DateTime<Utc>,
    path: Option<PathBuf>,
    entries: Vec<FailedRecord>,
    written: usize,
}

impl ErrorLog {
    pub fn new(dir: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        Self { dir: dir.into(), started_at, path: None, entries: Vec::new(), written: 0 }
    }

    pub fn note(&mut self, record: &CandidateRecord, outcome: &RecordOutcome) {
        if let Some(detail) = outcome.log_detail() {
            self.entries.push(FailedRecord {
                external_id: record.external_id.clone(),
                title: record.title.clone(),
                reason: outcome.reason().to_string(),
                detail,
                at: Utc::now(),
            });
        }
    }

    /// Run-level failure not tied to one record (source outage, fatal error).
    pub fn note_run(&mut self, reason: &str, detail: impl Into<String>) {
        self.entries.push(FailedRecord {
            external_id: String::new(),
            title: String::new(),
            reason: reason.to_string(),
            detail: detail.into(),
            at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn entries(&self) -> &[FailedRecord] { &self.entries }

    /// Rewrite the log file with every entry noted so far. Nothing is
    /// written while the log is empty.
    pub fn flush(&mut self) -> Result<Option<PathBuf>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let path = match &self.path {
            Some(path) if self.written == self.entries.len() => return Ok(Some(path.clone())),
            Some(path) => path.clone(),
            None => {
                let path = self.claim_path()?;
                info!(path = %path.display(), "Error log opened");
                self.path = Some(path.clone());
                path
            }
        };
        write_atomic(&self.dir, &path, &serde_json::to_vec_pretty(&self.entries)?)?;
        self.written = self.entries.len();
        debug!(path = %path.display(), n = self.written, "Error log flushed");
        Ok(Some(path))
    }

    /// Create an empty file under a name no other run holds.
    fn claim_path(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stamp = self.started_at.format("%Y%m%dT%H%M%S%.3fZ");
        let mut n = 0;
        loop {
            let name = match n {
                0 => format!("run-{stamp}.json"),
                _ => format!("run-{stamp}-{n}.json"),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
