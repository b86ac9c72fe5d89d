//! CrossRef works search client.
//!
//! API: https://api.crossref.org/works
//! Polite pool: send `mailto` on every request (see CrossRef etiquette).
//! Pagination is offset-based; CrossRef caps `offset` at 10,000, which the
//! per-query page cap keeps us well under.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, instrument};
use verdant_common::SandboxClient;

use super::{DateFilter, LiteratureSource, QueryField, SearchQuery, SourcePage};
use crate::models::CandidateRecord;

pub const CR_API_BASE: &str = "https://api.crossref.org";

const SELECT_FIELDS: &str = "DOI,title,abstract,author,container-title,published,\
published-print,published-online,issued,is-referenced-by-count";

/// Earliest publication year accepted from date-parts.
const MIN_YEAR: i32 = 1900;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
    static ref WS_RE: Regex = Regex::new(r"\s+").unwrap();
}

pub struct CrossRefClient {
    client: SandboxClient,
    base_url: String,
    mailto: String,
}

impl CrossRefClient {
    pub fn new(mailto: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let mailto = mailto.into();
        let user_agent = format!("Verdant/{} (mailto:{})", env!("CARGO_PKG_VERSION"), mailto);
        let client = SandboxClient::with_user_agent(timeout, &user_agent)?;
        Ok(Self { client, base_url: CR_API_BASE.to_string(), mailto })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.client.allow_url_host(&self.base_url);
        self
    }

    fn query_params(&self, query: &SearchQuery, offset: usize, rows: usize) -> Vec<(String, String)> {
        let field = match query.field {
            QueryField::Keyword => "query",
            QueryField::Author => "query.author",
        };

        let mut filters = vec!["has-abstract:true".to_string(), "type:journal-article".to_string()];
        match query.filter {
            Some(DateFilter::Published { from, until }) => {
                filters.push(format!("from-pub-date:{from}"));
                filters.push(format!("until-pub-date:{until}"));
            }
            Some(DateFilter::IndexedSince(since)) => {
                filters.push(format!("from-index-date:{since}"));
            }
            None => {}
        }

        vec![
            (field.to_string(), query.text.clone()),
            ("filter".to_string(), filters.join(",")),
            ("rows".to_string(), rows.to_string()),
            ("offset".to_string(), offset.to_string()),
            ("select".to_string(), SELECT_FIELDS.to_string()),
            ("mailto".to_string(), self.mailto.clone()),
        ]
    }
}

#[async_trait]
impl LiteratureSource for CrossRefClient {
    #[instrument(skip(self), fields(q = %query.text))]
    async fn search_page(
        &self,
        query: &SearchQuery,
        offset: usize,
        rows: usize,
    ) -> anyhow::Result<SourcePage> {
        let url = format!("{}/works", self.base_url.trim_end_matches('/'));
        let resp = self.client
            .get(&url)?
            .query(&self.query_params(query, offset, rows))
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("CrossRef search failed: HTTP {}", resp.status());
        }

        let body: serde_json::Value = resp.json().await?;
        let items = body["message"]["items"].as_array().cloned().unwrap_or_default();
        let records: Vec<CandidateRecord> = items.iter().filter_map(work_to_candidate).collect();

        debug!(offset, n = items.len(), kept = records.len(), "CrossRef page");
        Ok(SourcePage { raw_count: items.len(), records })
    }

    fn name(&self) -> &'static str { "crossref" }
}

// ── Conversion ─────────────────────────────────────────────────────────────

/// Normalize one CrossRef work. `None` when the work carries no DOI.
pub fn work_to_candidate(work: &serde_json::Value) -> Option<CandidateRecord> {
    let external_id = work["DOI"].as_str()?.trim().to_lowercase();
    if external_id.is_empty() {
        return None;
    }

    let title = work["title"]
        .as_array()
        .and_then(|t| t.first())
        .and_then(|t| t.as_str())
        .map(clean_markup)
        .unwrap_or_default();

    let abstract_text = work["abstract"]
        .as_str()
        .map(clean_abstract)
        .filter(|a| !a.is_empty());

    let authors: Vec<String> = work["author"]
        .as_array()
        .map(|list| {
            list.iter()
                .filter_map(|a| {
                    let given  = a["given"].as_str().unwrap_or("").trim();
                    let family = a["family"].as_str().unwrap_or("").trim();
                    let name = match (given.is_empty(), family.is_empty()) {
                        (_, true) => a["name"].as_str().unwrap_or("").trim().to_string(),
                        (true, false) => family.to_string(),
                        (false, false) => format!("{given} {family}"),
                    };
                    (!name.is_empty()).then_some(name)
                })
                .collect()
        })
        .unwrap_or_default();

    let venue = work["container-title"]
        .as_array()
        .and_then(|j| j.first())
        .and_then(|j| j.as_str())
        .map(String::from);

    let publication_date = resolve_date(work);

    Some(CandidateRecord {
        external_id,
        title,
        abstract_text,
        authors,
        publication_year: publication_date.map(|d| d.year()),
        publication_date,
        venue,
        citation_count: work["is-referenced-by-count"].as_i64().unwrap_or(0).max(0),
    })
}

/// Best-effort publication date: the first of `published`, `published-print`,
/// `published-online`, `issued` whose date-parts yield a year in range.
/// Missing month or day default to 1.
pub fn resolve_date(work: &serde_json::Value) -> Option<NaiveDate> {
    let max_year = Utc::now().year() + 1;
    ["published", "published-print", "published-online", "issued"]
        .iter()
        .find_map(|key| {
            let parts = work[*key]["date-parts"].as_array()?.first()?.as_array()?;
            let year = i32::try_from(parts.first()?.as_i64()?).ok()?;
            if !(MIN_YEAR..=max_year).contains(&year) {
                return None;
            }
            let part = |i: usize| parts.get(i).and_then(|v| v.as_u64()).map(|v| u32::try_from(v).unwrap_or(0));
            let month = part(1).unwrap_or(1);
            let day   = part(2).unwrap_or(1);
            NaiveDate::from_ymd_opt(year, month, day)
                .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
                .or_else(|| NaiveDate::from_ymd_opt(year, 1, 1))
        })
}

fn clean_markup(raw: &str) -> String {
    let text = TAG_RE.replace_all(raw, " ");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

/// CrossRef abstracts are JATS fragments, often headed by a literal
/// "Abstract" title element.
fn clean_abstract(raw: &str) -> String {
    let text = clean_markup(raw);
    match text.strip_prefix("Abstract") {
        Some(rest) if rest.starts_with([' ', ':', '.']) => {
            rest.trim_start_matches([' ', ':', '.']).to_string()
        }
        _ => text,
    }
}
