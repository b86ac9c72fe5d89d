//! Row types for the `papers` / `paper_metadata` pair.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const TABLE_PAPERS: &str = "papers";
pub const TABLE_PAPER_METADATA: &str = "paper_metadata";

// =============================================================================
// Parent row
// =============================================================================

/// A paper about to be inserted. The id is generated by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPaper {
    pub doi: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub publication_year: Option<i32>,
    pub publication_date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub citation_count: i64,
}

impl NewPaper {
    /// Mirrors the CHECK constraints on `papers`.
    pub fn check_constraints(&self) -> Result<(), String> {
        if self.doi.trim().is_empty() {
            return Err("doi must not be empty".to_string());
        }
        if self.citation_count < 0 {
            return Err(format!("citation_count {} is negative", self.citation_count));
        }
        Ok(())
    }
}

// =============================================================================
// Child row
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Derived metadata for one paper. `paper_id` is filled in by the store
/// from the parent insert inside the same transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadataRow {
    pub ecosystem: Option<String>,
    pub methods: Vec<String>,
    pub taxon_coverage: Vec<String>,
    pub framework_alignment: Vec<String>,
    pub geo_text: Option<String>,
    pub geo_point: Option<GeoPoint>,
    pub geo_confidence: Option<f64>,
    pub temporal_start: Option<i32>,
    pub temporal_end: Option<i32>,
    pub threat_types: Vec<String>,
    pub intervention_types: Vec<String>,
    pub study_type: Option<String>,
    pub traditional_knowledge: bool,
}

impl PaperMetadataRow {
    /// Mirrors the CHECK constraints on `paper_metadata`.
    pub fn check_constraints(&self) -> Result<(), String> {
        if let (Some(start), Some(end)) = (self.temporal_start, self.temporal_end) {
            if start > end {
                return Err(format!("temporal_start {start} is after temporal_end {end}"));
            }
        }
        if let Some(c) = self.geo_confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(format!("geo_confidence {c} outside [0, 1]"));
            }
        }
        if let Some(p) = self.geo_point {
            if !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon) {
                return Err(format!("geo_point ({}, {}) out of range", p.lat, p.lon));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_temporal_range_rejected() {
        let row = PaperMetadataRow {
            temporal_start: Some(2020),
            temporal_end: Some(1995),
            ..Default::default()
        };
        assert!(row.check_constraints().unwrap_err().contains("temporal_start"));
    }

    #[test]
    fn test_open_temporal_range_accepted() {
        let row = PaperMetadataRow { temporal_start: Some(1990), ..Default::default() };
        assert!(row.check_constraints().is_ok());
    }

    #[test]
    fn test_geo_point_bounds() {
        let row = PaperMetadataRow {
            geo_point: Some(GeoPoint { lat: 95.0, lon: 10.0 }),
            ..Default::default()
        };
        assert!(row.check_constraints().is_err());
    }

    #[test]
    fn test_empty_doi_rejected() {
        let paper = NewPaper {
            doi: "  ".into(),
            title: "t".into(),
            abstract_text: None,
            authors: vec![],
            publication_year: None,
            publication_date: None,
            venue: None,
            citation_count: 0,
        };
        assert!(paper.check_constraints().is_err());
    }
}
