//! Cheap local gate run before enrichment.
//!
//! A candidate is rejected when its title and abstract hit enough terms from
//! one exclusion rule (clinical medicine, business and finance, pure
//! engineering) and contain none of the ecological anchor terms. Anchors
//! always win: a paper on "deep learning for species identification" goes
//! through. The thresholds lean towards letting candidates pass, since a
//! wrongly rejected paper is silently lost while a wrongly passed one only
//! costs one classification call.

use crate::models::CandidateRecord;

/// One exclusion heuristic. Term lists of different rules do not overlap.
#[derive(Debug, Clone, Copy)]
pub struct ExclusionRule {
    pub name: &'static str,
    pub terms: &'static [&'static str],
    /// Distinct terms that must appear before the rule fires.
    pub min_hits: usize,
}

pub const EXCLUSION_RULES: &[ExclusionRule] = &[
    ExclusionRule {
        name: "clinical",
        terms: &[
            "patient", "clinical trial", "randomized controlled", "randomised controlled",
            "hospital", "diagnosis", "chemotherapy", "surgery", "surgical", "placebo",
            "dosage", "tumor", "tumour", "cancer", "covid-19", "sars-cov-2", "nursing",
        ],
        min_hits: 2,
    },
    ExclusionRule {
        name: "business",
        terms: &[
            "stock market", "shareholder", "corporate governance", "firm performance",
            "marketing", "consumer behavior", "consumer behaviour", "revenue",
            "profitability", "investor", "stock price", "monetary policy", "accounting",
        ],
        min_hits: 2,
    },
    ExclusionRule {
        name: "engineering",
        terms: &[
            "semiconductor", "transistor", "circuit", "antenna", "wireless network",
            "5g", "blockchain", "cryptograph", "compiler", "software engineering",
            "microprocessor", "robot arm", "power grid",
        ],
        min_hits: 2,
    },
];

/// Terms that mark a candidate as in-domain regardless of exclusion hits.
pub const ANCHOR_TERMS: &[&str] = &[
    "ecosystem", "ecolog", "biodiversity", "species", "conservation", "habitat",
    "wildlife", "forest", "wetland", "coral", "fisheries", "climate change",
    "land use", "pollinat", "invasive", "protected area", "vegetation", "soil",
    "watershed", "biome", "fauna", "flora",
];

/// The exclusion rule `candidate` triggers, if any.
pub fn matched_rule(candidate: &CandidateRecord) -> Option<&'static str> {
    let text = candidate.search_text();
    if ANCHOR_TERMS.iter().any(|t| contains_term(&text, t)) {
        return None;
    }
    EXCLUSION_RULES
        .iter()
        .find(|rule| rule.terms.iter().filter(|t| contains_term(&text, t)).count() >= rule.min_hits)
        .map(|rule| rule.name)
}

pub fn is_likely_irrelevant(candidate: &CandidateRecord) -> bool {
    matched_rule(candidate).is_some()
}

/// `term` occurs in `text` starting at a word boundary. Suffixes are allowed
/// so "patient" also matches "patients".
fn contains_term(text: &str, term: &str) -> bool {
    text.match_indices(term).any(|(i, _)| {
        text[..i].chars().next_back().map_or(true, |c| !c.is_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cand(title: &str, abstract_text: &str) -> CandidateRecord {
        CandidateRecord {
            external_id: "10.1/p".into(),
            title: title.into(),
            abstract_text: Some(abstract_text.into()),
            authors: vec![],
            publication_year: None,
            publication_date: None,
            venue: None,
            citation_count: 0,
        }
    }

    #[test]
    fn test_clinical_paper_rejected() {
        let c = cand(
            "Adjuvant chemotherapy outcomes",
            "A randomized controlled trial of 400 patients after surgery.",
        );
        assert_eq!(matched_rule(&c), Some("clinical"));
        assert!(is_likely_irrelevant(&c));
    }

    #[test]
    fn test_business_paper_rejected() {
        let c = cand("Corporate governance and firm performance", "Evidence from shareholder votes.");
        assert_eq!(matched_rule(&c), Some("business"));
    }

    #[test]
    fn test_single_hit_is_not_enough() {
        let c = cand("Hospital wastewater discharge", "Effluent volumes measured over a year.");
        assert_eq!(matched_rule(&c), None);
    }

    #[test]
    fn test_anchor_overrides_exclusion() {
        let c = cand(
            "Revenue and profitability of community forest enterprises",
            "Timber income in Mexican ejidos.",
        );
        assert_eq!(matched_rule(&c), None);
    }

    #[test]
    fn test_term_must_start_at_word_boundary() {
        // "outpatient" does not count as "patient"; "tumors" counts as "tumor".
        assert!(!contains_term("outpatient clinic", "patient"));
        assert!(contains_term("two tumors grew", "tumor"));
        assert!(contains_term("5g rollout", "5g"));
    }

    #[test]
    fn test_rule_terms_are_disjoint() {
        let mut seen = HashSet::new();
        for rule in EXCLUSION_RULES {
            for term in rule.terms {
                assert!(seen.insert(*term), "term '{term}' appears in more than one rule");
            }
        }
        for anchor in ANCHOR_TERMS {
            assert!(!seen.contains(anchor), "anchor '{anchor}' is also an exclusion term");
        }
    }

    #[test]
    fn test_ecology_paper_passes() {
        let c = cand(
            "Camera-trap survey of mesocarnivores",
            "Occupancy of mammal species across a fragmented habitat mosaic.",
        );
        assert!(!is_likely_irrelevant(&c));
    }
}
