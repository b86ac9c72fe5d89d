use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::schema::{NewPaper, PaperMetadataRow};

/// Result of writing a paper/metadata pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Both rows committed; carries the parent's generated id.
    Inserted(Uuid),
    /// A parent with the same DOI already exists. Nothing was written and
    /// the existing rows were left untouched.
    Duplicate,
}

/// Durable store for the paper/metadata pair.
///
/// `persist` is atomic: either both rows are committed or neither is. The
/// DOI uniqueness constraint is the authoritative dedup boundary; `exists`
/// is only an optimisation callers use to avoid paying for enrichment.
#[async_trait]
pub trait PaperStore: Send + Sync {
    async fn exists(&self, doi: &str) -> Result<bool>;

    async fn persist(&self, paper: &NewPaper, metadata: &PaperMetadataRow) -> Result<PersistOutcome>;

    async fn paper_count(&self) -> Result<i64>;

    async fn metadata_count(&self) -> Result<i64>;
}
