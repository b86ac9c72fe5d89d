//! Durable progress marker for the processing phase.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use verdant_common::{Result, VerdantError};

use crate::cache::{write_atomic, ChunkedCache};
use crate::stats::RunStats;

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Records `[0, processed_count)` of the working set have been attempted.
    pub processed_count: usize,
    /// Working-set size the offset refers to.
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
    pub stats: RunStats,
}

impl Checkpoint {
    /// Offset to resume at, if this checkpoint applies to a working set of
    /// `total` records.
    pub fn resume_offset(&self, total: usize) -> Option<usize> {
        (self.total_count == total && self.processed_count <= total).then_some(self.processed_count)
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// Replace the checkpoint file in one rename.
    pub fn save(&self, processed_count: usize, total_count: usize, stats: &RunStats) -> Result<Checkpoint> {
        let checkpoint = Checkpoint {
            processed_count,
            total_count,
            timestamp: Utc::now(),
            stats: stats.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        fs::create_dir_all(&self.dir)
            .and_then(|_| write_atomic(&self.dir, &self.path(), &bytes))
            .map_err(|e| VerdantError::Checkpoint(format!("writing {}: {e}", self.path().display())))?;
        debug!(processed_count, total_count, "Checkpoint saved");
        Ok(checkpoint)
    }

    /// The last checkpoint, or `None` when no run is in progress.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let checkpoint = serde_json::from_slice(&bytes)
            .map_err(|e| VerdantError::Checkpoint(format!("{} is corrupt: {e}", path.display())))?;
        Ok(Some(checkpoint))
    }

    /// Remove the checkpoint only, keeping the cached working set.
    pub fn remove(&self) -> Result<()> {
        remove_if_exists(&self.path())
    }

    /// Forget all progress: checkpoint, every cache chunk and the
    /// collection manifest.
    ///
    /// The run controller calls this once the covered prefix reaches the end
    /// of the working set, or when a fresh run was asked for.
    pub fn clear(&self, cache: &ChunkedCache) -> Result<()> {
        self.remove()?;
        cache.clear()?;
        info!(dir = %self.dir.display(), "Checkpoint and cache cleared");
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert_eq!(store.load().unwrap(), None);

        let stats = RunStats { inserted: 40, duplicates: 10, ..Default::default() };
        let saved = store.save(50, 1_000, &stats).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.stats.inserted, 40);
    }

    #[test]
    fn test_file_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store.save(3, 9, &RunStats::default()).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["processedCount"], 3);
        assert_eq!(raw["totalCount"], 9);
        assert!(raw["timestamp"].is_string());
        assert!(raw["stats"].is_object());
    }

    #[test]
    fn test_resume_offset_requires_matching_total() {
        let cp = Checkpoint {
            processed_count: 150,
            total_count: 400,
            timestamp: Utc::now(),
            stats: RunStats::default(),
        };
        assert_eq!(cp.resume_offset(400), Some(150));
        assert_eq!(cp.resume_offset(401), None);
    }

    #[test]
    fn test_clear_removes_checkpoint_and_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 2);
        let store = CheckpointStore::new(dir.path());
        let rec = CandidateRecord {
            external_id: "10.1/z".into(),
            title: "t".into(),
            abstract_text: None,
            authors: vec![],
            publication_year: None,
            publication_date: None,
            venue: None,
            citation_count: 0,
        };
        cache.flush(&[rec.clone(), rec]).unwrap();
        store.save(1, 2, &RunStats::default()).unwrap();

        store.clear(&cache).unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert!(!cache.exists().unwrap());
        // Clearing twice is harmless.
        store.clear(&cache).unwrap();
    }

    #[test]
    fn test_corrupt_checkpoint_is_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(store.path(), b"{\"processedCount\": 12").unwrap();
        assert!(matches!(store.load(), Err(VerdantError::Checkpoint(_))));
    }
}
