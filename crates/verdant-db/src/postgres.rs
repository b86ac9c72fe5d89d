//! PostgreSQL store for the ingestion pipeline.
//!
//! Handles:
//! - Paper INSERT with DOI deduplication (`ON CONFLICT (doi) DO NOTHING`)
//! - Metadata INSERT in the same transaction as its parent
//! - Rollback of the pair when either insert is rejected, reporting the
//!   rejection rather than any rollback failure

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::schema::{NewPaper, PaperMetadataRow, TABLE_PAPERS, TABLE_PAPER_METADATA};
use crate::store::{PaperStore, PersistOutcome};

/// PostgreSQL paper store.
#[derive(Clone)]
pub struct PgPaperStore {
    pool: PgPool,
}

impl PgPaperStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the bundled migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

/// Roll back after a failed statement. The statement's error is the one
/// the caller sees; a failing rollback only leaves the connection to be
/// discarded by the pool.
async fn discard(tx: sqlx::Transaction<'_, sqlx::Postgres>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback after rejected insert failed");
    }
}

#[async_trait]
impl PaperStore for PgPaperStore {
    async fn exists(&self, doi: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM papers WHERE doi = $1)")
            .bind(doi)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DbError::from_sqlx(TABLE_PAPERS, e))?;
        Ok(found)
    }

    #[instrument(skip_all, fields(doi = %paper.doi))]
    async fn persist(&self, paper: &NewPaper, metadata: &PaperMetadataRow) -> Result<PersistOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted: Result<Option<Uuid>> = sqlx::query_scalar(
            r#"
            INSERT INTO papers
                (doi, title, abstract_text, authors, publication_year,
                 publication_date, venue, citation_count)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            ON CONFLICT (doi) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&paper.doi)
        .bind(&paper.title)
        .bind(&paper.abstract_text)
        .bind(&paper.authors)
        .bind(paper.publication_year)
        .bind(paper.publication_date)
        .bind(&paper.venue)
        .bind(paper.citation_count)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DbError::from_sqlx(TABLE_PAPERS, e));

        let paper_id = match inserted {
            Ok(Some(id)) => id,
            Ok(None) => {
                tx.rollback().await?;
                debug!("DOI already present, pair skipped");
                return Ok(PersistOutcome::Duplicate);
            }
            Err(e) => {
                discard(tx).await;
                return Err(e);
            }
        };

        let child = sqlx::query(
            r#"
            INSERT INTO paper_metadata
                (paper_id, ecosystem, methods, taxon_coverage, framework_alignment,
                 geo_text, geo_lat, geo_lon, geo_confidence,
                 temporal_start, temporal_end, threat_types, intervention_types,
                 study_type, traditional_knowledge)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15)
            "#,
        )
        .bind(paper_id)
        .bind(&metadata.ecosystem)
        .bind(&metadata.methods)
        .bind(&metadata.taxon_coverage)
        .bind(&metadata.framework_alignment)
        .bind(&metadata.geo_text)
        .bind(metadata.geo_point.map(|p| p.lat))
        .bind(metadata.geo_point.map(|p| p.lon))
        .bind(metadata.geo_confidence)
        .bind(metadata.temporal_start)
        .bind(metadata.temporal_end)
        .bind(&metadata.threat_types)
        .bind(&metadata.intervention_types)
        .bind(&metadata.study_type)
        .bind(metadata.traditional_knowledge)
        .execute(&mut *tx)
        .await;

        if let Err(e) = child {
            discard(tx).await;
            return Err(DbError::from_sqlx(TABLE_PAPER_METADATA, e));
        }

        tx.commit().await?;
        debug!(paper_id = %paper_id, "Pair committed");
        Ok(PersistOutcome::Inserted(paper_id))
    }

    async fn paper_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM papers").fetch_one(&self.pool).await?)
    }

    async fn metadata_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM paper_metadata").fetch_one(&self.pool).await?)
    }
}
