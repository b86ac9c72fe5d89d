//! Chunked on-disk snapshot of the working set.
//!
//! The set is written as numbered JSON arrays (`chunk_0.json`,
//! `chunk_1.json`, …) of at most `chunk_size` records each. A single file
//! for the whole set outgrows what `serde_json` can comfortably hold in one
//! buffer at a few hundred thousand records. Reload order is numeric, not
//! lexicographic, so `chunk_10` follows `chunk_9`.
//!
//! Beside the chunks, `collection.json` records which query groups the
//! chunks already hold and whether the sweep finished. Chunks without a
//! finished manifest are a partial working set.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use verdant_common::{Result, VerdantError};

use crate::models::CandidateRecord;
use crate::stats::RunStats;

pub const MANIFEST_FILE: &str = "collection.json";

lazy_static! {
    static ref CHUNK_RE: Regex = Regex::new(r"^chunk_(\d+)\.json$").unwrap();
}

/// Progress of the sweep that produced the chunks beside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionManifest {
    /// Query groups whose results are in the chunks, in sweep order.
    pub completed_groups: Vec<String>,
    /// Set once every group was swept or the target was reached.
    pub complete: bool,
    pub records: usize,
    /// Collection counters summed over every invocation of this sweep.
    pub stats: RunStats,
    pub source_failures: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CollectionManifest {
    pub fn has_group(&self, name: &str) -> bool {
        self.completed_groups.iter().any(|g| g == name)
    }
}

#[derive(Debug, Clone)]
pub struct ChunkedCache {
    dir: PathBuf,
    chunk_size: usize,
}

impl ChunkedCache {
    pub fn new(dir: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self { dir: dir.into(), chunk_size: chunk_size.max(1) }
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn chunk_path(&self, n: usize) -> PathBuf {
        self.dir.join(format!("chunk_{n}.json"))
    }

    /// Numbered chunk files currently on disk, in ascending numeric order.
    fn chunk_files(&self) -> Result<Vec<(usize, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(caps) = name.to_str().and_then(|n| CHUNK_RE.captures(n)) else { continue };
            let n: usize = caps[1]
                .parse()
                .map_err(|_| VerdantError::Cache(format!("bad chunk number in {:?}", name)))?;
            files.push((n, entry.path()));
        }
        files.sort_by_key(|(n, _)| *n);
        Ok(files)
    }

    pub fn chunk_count(&self) -> Result<usize> {
        Ok(self.chunk_files()?.len())
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.chunk_count()? > 0)
    }

    /// Replace the snapshot with `records`. Returns the number of chunks written.
    ///
    /// Each chunk is written to a temp file and renamed into place, so a
    /// crash mid-flush leaves every chunk either old or new, never torn.
    pub fn flush(&self, records: &[CandidateRecord]) -> Result<usize> {
        fs::create_dir_all(&self.dir)?;

        let mut written = 0;
        for (n, chunk) in records.chunks(self.chunk_size).enumerate() {
            let path = self.chunk_path(n);
            write_atomic(&self.dir, &path, &serde_json::to_vec(chunk)?)
                .map_err(|e| VerdantError::Cache(format!("writing {}: {e}", path.display())))?;
            written += 1;
        }

        for (n, path) in self.chunk_files()? {
            if n >= written {
                fs::remove_file(&path)?;
            }
        }

        info!(records = records.len(), chunks = written, dir = %self.dir.display(), "Working set flushed");
        Ok(written)
    }

    /// Concatenate all chunks in numeric order.
    pub fn load(&self) -> Result<Vec<CandidateRecord>> {
        let files = self.chunk_files()?;
        for (expected, (n, _)) in files.iter().enumerate() {
            if *n != expected {
                return Err(VerdantError::Cache(format!(
                    "chunk sequence has a gap: expected chunk_{expected}, found chunk_{n}"
                )));
            }
        }

        let mut records = Vec::new();
        for (_, path) in &files {
            let bytes = fs::read(path)?;
            let chunk: Vec<CandidateRecord> = serde_json::from_slice(&bytes)
                .map_err(|e| VerdantError::Cache(format!("{} is corrupt: {e}", path.display())))?;
            debug!(path = %path.display(), n = chunk.len(), "Chunk loaded");
            records.extend(chunk);
        }
        Ok(records)
    }

    /// Record count of each chunk, in order.
    pub fn chunk_lengths(&self) -> Result<Vec<usize>> {
        self.chunk_files()?
            .iter()
            .map(|(_, path)| {
                let chunk: Vec<serde_json::Value> = serde_json::from_slice(&fs::read(path)?)
                    .map_err(|e| VerdantError::Cache(format!("{} is corrupt: {e}", path.display())))?;
                Ok(chunk.len())
            })
            .collect()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Replace the manifest in one rename, stamping `updated_at`.
    pub fn save_manifest(&self, manifest: &mut CollectionManifest) -> Result<()> {
        manifest.updated_at = Some(Utc::now());
        let path = self.manifest_path();
        let bytes = serde_json::to_vec_pretty(manifest)?;
        fs::create_dir_all(&self.dir)
            .and_then(|_| write_atomic(&self.dir, &path, &bytes))
            .map_err(|e| VerdantError::Cache(format!("writing {}: {e}", path.display())))?;
        debug!(groups = manifest.completed_groups.len(), complete = manifest.complete, "Collection manifest saved");
        Ok(())
    }

    pub fn load_manifest(&self) -> Result<Option<CollectionManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let manifest = serde_json::from_slice(&fs::read(&path)?)
            .map_err(|e| VerdantError::Cache(format!("{} is corrupt: {e}", path.display())))?;
        Ok(Some(manifest))
    }

    /// Remove every chunk and the manifest.
    pub fn clear(&self) -> Result<()> {
        for (_, path) in self.chunk_files()? {
            fs::remove_file(path)?;
        }
        match fs::remove_file(self.manifest_path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Write `bytes` to `target` through a temp file in `dir` and an atomic rename.
pub(crate) fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn rec(i: usize) -> CandidateRecord {
        CandidateRecord {
            external_id: format!("10.5555/{i}"),
            title: format!("Paper {i}"),
            abstract_text: Some(format!("Abstract number {i}")),
            authors: vec![format!("Author {i}")],
            publication_year: Some(2000 + (i % 20) as i32),
            publication_date: None,
            venue: None,
            citation_count: i as i64,
        }
    }

    #[test]
    fn test_round_trip_sizes() {
        const C: usize = 4;
        for m in [0, 1, C, C + 1, 10 * C] {
            let dir = tempfile::tempdir().unwrap();
            let cache = ChunkedCache::new(dir.path(), C);
            let records: Vec<_> = (0..m).map(rec).collect();

            let chunks = cache.flush(&records).unwrap();
            assert_eq!(chunks, m.div_ceil(C), "chunk count for m={m}");

            let loaded = cache.load().unwrap();
            let want: HashSet<_> = records.iter().map(|r| r.external_id.clone()).collect();
            let got: HashSet<_> = loaded.iter().map(|r| r.external_id.clone()).collect();
            assert_eq!(got, want, "m={m}");
            assert_eq!(loaded, records, "order preserved for m={m}");
        }
    }

    #[test]
    fn test_numeric_reload_order_past_ten_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 1);
        let records: Vec<_> = (0..12).map(rec).collect();
        cache.flush(&records).unwrap();

        let loaded = cache.load().unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.citation_count).collect();
        assert_eq!(ids, (0..12).collect::<Vec<i64>>());
    }

    #[test]
    fn test_shrinking_flush_removes_stale_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 2);
        cache.flush(&(0..7).map(rec).collect::<Vec<_>>()).unwrap();
        assert_eq!(cache.chunk_count().unwrap(), 4);

        cache.flush(&(0..3).map(rec).collect::<Vec<_>>()).unwrap();
        assert_eq!(cache.chunk_lengths().unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_corrupt_chunk_is_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 2);
        cache.flush(&(0..3).map(rec).collect::<Vec<_>>()).unwrap();
        fs::write(dir.path().join("chunk_1.json"), b"[{\"externalId\": ").unwrap();

        let err = cache.load().unwrap_err();
        assert!(matches!(err, VerdantError::Cache(_)), "got {err:?}");
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_missing_dir_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path().join("never-created"), 10);
        assert!(!cache.exists().unwrap());
        assert!(cache.load().unwrap().is_empty());
    }

    #[test]
    fn test_clear_leaves_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 2);
        cache.flush(&(0..5).map(rec).collect::<Vec<_>>()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        cache.clear().unwrap();
        assert_eq!(cache.chunk_count().unwrap(), 0);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_manifest_save_load_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path().join("cache"), 2);
        assert_eq!(cache.load_manifest().unwrap(), None);

        let mut manifest = CollectionManifest {
            completed_groups: vec!["marine".into()],
            records: 3,
            stats: RunStats { pages_fetched: 2, ..Default::default() },
            ..Default::default()
        };
        cache.save_manifest(&mut manifest).unwrap();
        let loaded = cache.load_manifest().unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.updated_at.is_some());
        assert!(loaded.has_group("marine"));
        assert!(!loaded.complete);

        let raw: serde_json::Value = serde_json::from_slice(&fs::read(cache.manifest_path()).unwrap()).unwrap();
        assert_eq!(raw["completedGroups"][0], "marine");

        cache.clear().unwrap();
        assert_eq!(cache.load_manifest().unwrap(), None);
    }

    #[test]
    fn test_corrupt_manifest_is_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 2);
        fs::write(cache.manifest_path(), b"{\"complete\": tr").unwrap();
        assert!(matches!(cache.load_manifest(), Err(VerdantError::Cache(_))));
    }
}
