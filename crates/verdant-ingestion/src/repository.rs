//! Store access for the ingestion pipeline.
//!
//! Maps ingestion models onto the `papers` / `paper_metadata` row types and
//! writes them through a [`PaperStore`]. The store owns atomicity and the
//! DOI uniqueness boundary; this layer only converts and logs.

use std::sync::Arc;

use tracing::{debug, instrument};
use verdant_db::{DbError, GeoPoint, NewPaper, PaperMetadataRow, PaperStore, PersistOutcome};

use crate::models::{CandidateRecord, EnrichedMetadata};

#[derive(Clone)]
pub struct IngestionRepository {
    store: Arc<dyn PaperStore>,
}

impl IngestionRepository {
    pub fn new(store: Arc<dyn PaperStore>) -> Self { Self { store } }

    /// Whether a paper with this DOI is already stored.
    pub async fn exists(&self, doi: &str) -> Result<bool, DbError> {
        self.store.exists(doi).await
    }

    /// Write the paper and its metadata as one unit. A DOI that is already
    /// present yields `Duplicate` and leaves the stored rows alone.
    #[instrument(skip_all, fields(doi = %candidate.external_id))]
    pub async fn persist(
        &self,
        candidate: &CandidateRecord,
        metadata: &EnrichedMetadata,
    ) -> Result<PersistOutcome, DbError> {
        let outcome = self
            .store
            .persist(&to_new_paper(candidate), &to_metadata_row(metadata))
            .await?;
        match outcome {
            PersistOutcome::Inserted(id) => debug!(paper_id = %id, "Paper inserted"),
            PersistOutcome::Duplicate => debug!("Paper already exists, skipped"),
        }
        Ok(outcome)
    }
}

pub fn to_new_paper(c: &CandidateRecord) -> NewPaper {
    NewPaper {
        doi: c.external_id.clone(),
        title: c.title.clone(),
        abstract_text: c.abstract_text.clone(),
        authors: c.authors.clone(),
        publication_year: c.publication_year,
        publication_date: c.publication_date,
        venue: c.venue.clone(),
        citation_count: c.citation_count,
    }
}

pub fn to_metadata_row(m: &EnrichedMetadata) -> PaperMetadataRow {
    let geo = &m.geographic_scope;
    PaperMetadataRow {
        ecosystem: m.ecosystem.clone(),
        methods: m.methods.clone(),
        taxon_coverage: m.taxonomic_coverage.clone(),
        framework_alignment: m.framework_alignment.clone(),
        geo_text: geo.label.clone(),
        geo_point: geo.point.map(|p| GeoPoint { lat: p.lat, lon: p.lon }),
        // A confidence without a point has nothing to qualify.
        geo_confidence: geo.point.and(geo.confidence),
        temporal_start: m.temporal_coverage.start_year,
        temporal_end: m.temporal_coverage.end_year,
        threat_types: m.threat_types.clone(),
        intervention_types: m.intervention_types.clone(),
        study_type: m.study_type.clone(),
        traditional_knowledge: m.traditional_knowledge,
    }
}
