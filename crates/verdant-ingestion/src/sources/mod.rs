//! Literature source clients.

pub mod crossref;

use async_trait::async_trait;
use chrono::NaiveDate;
use crate::models::CandidateRecord;

/// Which field a query string is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryField {
    /// Free text over title, abstract and bibliographic fields.
    Keyword,
    /// Contributor names.
    Author,
}

/// Date window applied to every query of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    /// Publication date inside `[from, until]`.
    Published { from: NaiveDate, until: NaiveDate },
    /// Records indexed by the source on or after `since`.
    IndexedSince(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    pub field: QueryField,
    pub filter: Option<DateFilter>,
}

/// One page of results.
///
/// `raw_count` is the number of items the service returned, before records
/// without a DOI were dropped; pagination decisions use it.
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub raw_count: usize,
    pub records: Vec<CandidateRecord>,
}

/// Common interface for paginated bibliographic search services.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Fetch `rows` results starting at `offset`.
    async fn search_page(
        &self,
        query: &SearchQuery,
        offset: usize,
        rows: usize,
    ) -> anyhow::Result<SourcePage>;

    fn name(&self) -> &'static str;
}
