//! In-process store with the same uniqueness, constraint and rollback
//! behaviour as [`PgPaperStore`](crate::PgPaperStore). Backs `--dry-run`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::schema::{NewPaper, PaperMetadataRow, TABLE_PAPERS, TABLE_PAPER_METADATA};
use crate::store::{PaperStore, PersistOutcome};

#[derive(Default)]
struct Tables {
    papers: HashMap<Uuid, NewPaper>,
    by_doi: HashMap<String, Uuid>,
    metadata: HashMap<Uuid, PaperMetadataRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Pre-populate a parent row, as if a curator had already entered it.
    pub async fn seed(&self, paper: NewPaper, metadata: PaperMetadataRow) -> Uuid {
        let mut t = self.tables.lock().await;
        let id = Uuid::new_v4();
        t.by_doi.insert(paper.doi.clone(), id);
        t.papers.insert(id, paper);
        t.metadata.insert(id, metadata);
        id
    }

    pub async fn paper_by_doi(&self, doi: &str) -> Option<(NewPaper, Option<PaperMetadataRow>)> {
        let t = self.tables.lock().await;
        let id = t.by_doi.get(doi)?;
        Some((t.papers.get(id)?.clone(), t.metadata.get(id).cloned()))
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn exists(&self, doi: &str) -> Result<bool> {
        Ok(self.tables.lock().await.by_doi.contains_key(doi))
    }

    async fn persist(&self, paper: &NewPaper, metadata: &PaperMetadataRow) -> Result<PersistOutcome> {
        // The lock is the transaction: both rows are validated before either
        // becomes visible, so a rejected child leaves no parent behind.
        let mut t = self.tables.lock().await;

        if t.by_doi.contains_key(&paper.doi) {
            return Ok(PersistOutcome::Duplicate);
        }
        paper
            .check_constraints()
            .map_err(|message| DbError::Constraint { table: TABLE_PAPERS, message })?;
        metadata
            .check_constraints()
            .map_err(|message| DbError::Constraint { table: TABLE_PAPER_METADATA, message })?;

        let id = Uuid::new_v4();
        t.by_doi.insert(paper.doi.clone(), id);
        t.papers.insert(id, paper.clone());
        t.metadata.insert(id, metadata.clone());
        Ok(PersistOutcome::Inserted(id))
    }

    async fn paper_count(&self) -> Result<i64> {
        Ok(self.tables.lock().await.papers.len() as i64)
    }

    async fn metadata_count(&self) -> Result<i64> {
        Ok(self.tables.lock().await.metadata.len() as i64)
    }
}
