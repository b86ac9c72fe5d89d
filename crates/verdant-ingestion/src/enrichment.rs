//! Per-candidate classification through the text-classification service.
//!
//! One request per candidate. The reply is run through the JSON extractor
//! and the coercing [`EnrichedMetadata`] schema; every failure comes back as
//! an [`EnrichError`] value so the run controller can record it and move on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use verdant_llm::{extract_json, ExtractError, LlmBackend, LlmError, LlmRequest, LlmResponse, Message};

use crate::models::{CandidateRecord, EnrichedMetadata};

/// Abstracts beyond this many characters are truncated in the prompt.
const MAX_ABSTRACT_CHARS: usize = 6_000;

const SYSTEM_PROMPT: &str = r#"You classify ecology and conservation research papers. Given a paper's title and abstract, reply with ONE JSON object and nothing else, using exactly these keys:

- ecosystem: the single primary ecosystem studied (e.g. "tropical forest", "coral reef", "grassland", "freshwater", "urban"), or null
- methods: list of research methods (e.g. "camera trapping", "remote sensing", "eDNA", "meta-analysis")
- taxonomic_coverage: list of taxa studied, at the most specific level the abstract supports
- framework_alignment: list of policy frameworks or targets the work addresses (e.g. "CBD Target 3", "SDG 15", "IUCN Red List")
- geographic_scope: {"label": free-text place name, "point": {"lat": number, "lon": number} or null, "confidence": 0 to 1 for the point}
- temporal_coverage: {"start_year": integer or null, "end_year": integer or null} for the period the data covers
- threat_types: list of threats examined (e.g. "habitat loss", "invasive species", "climate change")
- intervention_types: list of conservation actions evaluated (e.g. "protected area", "restoration")
- study_type: one of "field study", "experimental", "modelling", "review", "meta-analysis", "policy analysis", "other"
- traditional_knowledge: true if the work draws on Indigenous or local traditional knowledge, else false

Use empty lists when nothing applies. Do not invent coordinates: give a point only for a specific, named place."#;

/// Token usage reported by one classification call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl From<&LlmResponse> for TokenUsage {
    fn from(resp: &LlmResponse) -> Self {
        Self {
            prompt_tokens: resp.prompt_tokens as u64,
            completion_tokens: resp.completion_tokens as u64,
        }
    }
}

/// A successful classification.
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub metadata: EnrichedMetadata,
    pub usage: TokenUsage,
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("classification service error: {0}")]
    Service(#[source] LlmError),

    #[error("classification timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered but no JSON object could be recovered. The
    /// tokens were still billed.
    #[error("unparsable classification: {source}")]
    Parse {
        #[source]
        source: ExtractError,
        usage: TokenUsage,
    },

    #[error("classification does not match schema: {source}")]
    Schema {
        #[source]
        source: serde_json::Error,
        usage: TokenUsage,
    },
}

impl EnrichError {
    /// Tokens consumed before the failure, if the service answered at all.
    pub fn usage(&self) -> Option<TokenUsage> {
        match self {
            EnrichError::Parse { usage, .. } | EnrichError::Schema { usage, .. } => Some(*usage),
            EnrichError::Service(_) | EnrichError::Timeout(_) => None,
        }
    }
}

pub struct EnrichmentClient {
    backend: Arc<dyn LlmBackend>,
    max_tokens: u32,
    timeout: Duration,
    calls: AtomicUsize,
}

impl EnrichmentClient {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            max_tokens: 1_024,
            timeout: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests issued so far, successful or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    #[instrument(skip(self, candidate), fields(doi = %candidate.external_id))]
    pub async fn enrich(&self, candidate: &CandidateRecord) -> Result<Enrichment, EnrichError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let req = LlmRequest {
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(user_prompt(candidate))],
            model: None,
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.0),
        };

        let resp = match tokio::time::timeout(self.timeout, self.backend.complete(req)).await {
            Err(_) => return Err(EnrichError::Timeout(self.timeout)),
            Ok(Err(e)) if e.is_timeout() => return Err(EnrichError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(EnrichError::Service(e)),
            Ok(Ok(resp)) => resp,
        };
        let usage = TokenUsage::from(&resp);

        let value = extract_json(&resp.content).map_err(|source| EnrichError::Parse { source, usage })?;
        let metadata = EnrichedMetadata::from_value(value).map_err(|source| EnrichError::Schema { source, usage })?;

        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            ecosystem = ?metadata.ecosystem,
            "Candidate enriched"
        );
        Ok(Enrichment { metadata, usage })
    }
}

fn user_prompt(candidate: &CandidateRecord) -> String {
    let abstract_text = candidate.abstract_text.as_deref().unwrap_or("").trim();
    let abstract_text = match abstract_text.char_indices().nth(MAX_ABSTRACT_CHARS) {
        Some((cut, _)) => &abstract_text[..cut],
        None => abstract_text,
    };
    format!("Title: {}\n\nAbstract: {}", candidate.title, abstract_text)
}
