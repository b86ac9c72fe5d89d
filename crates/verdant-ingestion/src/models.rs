//! Data models for the ingestion pipeline.
//!
//! `CandidateRecord` is what the collector produces and the cache stores.
//! `EnrichedMetadata` is the validated shape of the classifier's reply;
//! its deserializers coerce the loose JSON models emit into strict types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One bibliographic item pulled from the search service, keyed by DOI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub external_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub publication_year: Option<i32>,
    pub publication_date: Option<NaiveDate>,
    pub venue: Option<String>,
    #[serde(default)]
    pub citation_count: i64,
}

impl CandidateRecord {
    /// Length of the trimmed abstract in characters, 0 when absent.
    pub fn abstract_len(&self) -> usize {
        self.abstract_text.as_deref().map(|a| a.trim().chars().count()).unwrap_or(0)
    }

    pub fn has_abstract(&self) -> bool {
        self.abstract_len() > 0
    }

    /// Lower-cased title and abstract, the only text the pre-filter reads.
    pub fn search_text(&self) -> String {
        let mut text = self.title.to_lowercase();
        if let Some(a) = &self.abstract_text {
            text.push(' ');
            text.push_str(&a.to_lowercase());
        }
        text
    }
}

// ── Enriched metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographicScope {
    pub label: Option<String>,
    pub point: Option<GeoPoint>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalCoverage {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

/// Structured classification of one candidate.
///
/// Every list defaults to empty and never deserializes to null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMetadata {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub ecosystem: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub methods: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list", alias = "taxa")]
    pub taxonomic_coverage: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list", alias = "policy_alignment")]
    pub framework_alignment: Vec<String>,
    #[serde(default, deserialize_with = "lenient::geographic_scope")]
    pub geographic_scope: GeographicScope,
    #[serde(default, deserialize_with = "lenient::temporal_coverage")]
    pub temporal_coverage: TemporalCoverage,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub threat_types: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list", alias = "action_types")]
    pub intervention_types: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub study_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::boolean", alias = "traditional_knowledge_present")]
    pub traditional_knowledge: bool,
}

impl EnrichedMetadata {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Coercing deserializers for model output.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{GeoPoint, GeographicScope, TemporalCoverage};

    fn value<'de, D: Deserializer<'de>>(d: D) -> Result<Value, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.unwrap_or(Value::Null))
    }

    fn as_text(v: &Value) -> Option<String> {
        let s = match v {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let placeholder = matches!(s.to_lowercase().as_str(), "" | "null" | "none" | "n/a" | "unknown");
        (!placeholder).then_some(s)
    }

    fn as_year(v: &Value) -> Option<i32> {
        let y = match v {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().get(..4)?.parse::<i64>().ok()?,
            _ => return None,
        };
        (1000..=9999).contains(&y).then_some(y as i32)
    }

    fn as_f64(v: &Value) -> Option<f64> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|f: &f64| f.is_finite())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(as_text(&value(d)?))
    }

    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match value(d)? {
            Value::Array(items) => items.iter().filter_map(as_text).collect(),
            other => as_text(&other).into_iter().collect(),
        })
    }

    pub fn boolean<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match value(d)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "y" | "1"),
            _ => false,
        })
    }

    pub fn temporal_coverage<'de, D: Deserializer<'de>>(d: D) -> Result<TemporalCoverage, D::Error> {
        let v = value(d)?;
        let pick = |keys: &[&str]| keys.iter().find_map(|k| v.get(*k).and_then(as_year));
        Ok(TemporalCoverage {
            start_year: pick(&["start_year", "start", "from"]),
            end_year: pick(&["end_year", "end", "to"]),
        })
    }

    pub fn geographic_scope<'de, D: Deserializer<'de>>(d: D) -> Result<GeographicScope, D::Error> {
        let v = value(d)?;
        if let Some(label) = as_text(&v) {
            return Ok(GeographicScope { label: Some(label), ..Default::default() });
        }
        if !v.is_object() {
            return Ok(GeographicScope::default());
        }

        let label = ["label", "name", "text", "region"]
            .iter()
            .find_map(|k| v.get(*k).and_then(as_text));

        // Coordinates may sit under "point" or directly on the scope.
        let holder = v.get("point").filter(|p| p.is_object()).unwrap_or(&v);
        let lat = ["lat", "latitude"].iter().find_map(|k| holder.get(*k).and_then(as_f64));
        let lon = ["lon", "lng", "longitude"].iter().find_map(|k| holder.get(*k).and_then(as_f64));
        let point = match (lat, lon) {
            (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {
                Some(GeoPoint { lat, lon })
            }
            _ => None,
        };

        let confidence = v
            .get("confidence")
            .and_then(as_f64)
            .filter(|c| (0.0..=1.0).contains(c));

        Ok(GeographicScope { label, point, confidence })
    }
}
