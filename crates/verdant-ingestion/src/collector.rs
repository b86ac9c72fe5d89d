//! Source sweep for the collection phase.
//!
//! Queries run one at a time in plan order, pages in ascending offset order,
//! with a fixed pause before every request after the first. The working set
//! is flushed to the chunk cache whenever a query group finishes, and the
//! group is then recorded in the collection manifest so an interrupted sweep
//! resumes at the next group.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use verdant_common::Result;

use crate::cache::{ChunkedCache, CollectionManifest};
use crate::dedup::{CollectionSession, Insert};
use crate::sources::{LiteratureSource, SearchQuery};
use crate::stats::RunStats;

/// A top-level category (or one author) and the queries it expands to.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryGroup {
    pub name: String,
    pub queries: Vec<SearchQuery>,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Stop the whole sweep once the working set holds this many records.
    pub target: Option<usize>,
    pub page_size: usize,
    pub max_pages_per_query: usize,
    pub request_delay: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            target: None,
            page_size: 100,
            max_pages_per_query: 50,
            request_delay: Duration::from_millis(1_000),
        }
    }
}

/// What this invocation of the sweep did, beyond the records it left in
/// the session. Totals across invocations live in the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionReport {
    pub stats: RunStats,
    pub replaced: usize,
    pub skipped_groups: usize,
    pub target_reached: bool,
    pub source_failures: Vec<String>,
}

pub struct SourceCollector {
    source: Arc<dyn LiteratureSource>,
    config: CollectorConfig,
}

impl SourceCollector {
    pub fn new(source: Arc<dyn LiteratureSource>, config: CollectorConfig) -> Self {
        Self { source, config }
    }

    fn target_reached(&self, session: &CollectionSession) -> bool {
        self.config.target.is_some_and(|t| session.len() >= t)
    }

    /// Sweep every group not yet in `manifest` into `session`, flushing to
    /// `cache` and saving the manifest after each. The manifest is marked
    /// complete when the sweep ends.
    ///
    /// Source failures skip the rest of the failing query and are reported;
    /// only cache write failures return an error.
    pub async fn collect(
        &self,
        groups: &[QueryGroup],
        session: &mut CollectionSession,
        cache: &ChunkedCache,
        manifest: &mut CollectionManifest,
    ) -> Result<CollectionReport> {
        let mut report = CollectionReport::default();
        let base_stats = manifest.stats.clone();
        let base_failures = manifest.source_failures.clone();
        let mut first_request = true;

        for group in groups {
            if manifest.has_group(&group.name) {
                debug!(group = %group.name, "Group already collected, skipped");
                report.skipped_groups += 1;
                continue;
            }
            if self.target_reached(session) {
                report.target_reached = true;
                break;
            }
            info!(group = %group.name, queries = group.queries.len(), "Collecting group");

            for query in &group.queries {
                for page in 0..self.config.max_pages_per_query {
                    if self.target_reached(session) {
                        break;
                    }
                    if !first_request {
                        tokio::time::sleep(self.config.request_delay).await;
                    }
                    first_request = false;

                    let offset = page * self.config.page_size;
                    let result = match self.source.search_page(query, offset, self.config.page_size).await {
                        Ok(r) => r,
                        Err(e) => {
                            warn!(source = self.source.name(), q = %query.text, offset, error = %e, "Search failed, skipping query");
                            report.stats.source_errors += 1;
                            report.source_failures.push(format!("{} @ {offset}: {e:#}", query.text));
                            break;
                        }
                    };
                    report.stats.pages_fetched += 1;
                    report.stats.skipped_no_key += result.raw_count.saturating_sub(result.records.len());

                    for record in result.records {
                        if !record.has_abstract() {
                            report.stats.skipped_empty_abstract += 1;
                            continue;
                        }
                        if session.insert(record) == Insert::Replaced {
                            report.replaced += 1;
                        }
                    }
                    debug!(q = %query.text, offset, raw = result.raw_count, total = session.len(), "Page merged");

                    if result.raw_count < self.config.page_size {
                        break;
                    }
                }
            }

            cache.flush(session.records())?;
            manifest.completed_groups.push(group.name.clone());
            record_progress(manifest, &base_stats, &base_failures, &report, session.len());
            cache.save_manifest(manifest)?;

            if self.target_reached(session) {
                info!(collected = session.len(), "Target reached");
                report.target_reached = true;
                break;
            }
        }

        report.stats.collected = session.len();
        record_progress(manifest, &base_stats, &base_failures, &report, session.len());
        manifest.complete = true;
        cache.save_manifest(manifest)?;

        info!(
            collected = report.stats.collected,
            pages = report.stats.pages_fetched,
            source_errors = report.stats.source_errors,
            replaced = report.replaced,
            resumed_groups = report.skipped_groups,
            "Collection sweep complete"
        );
        Ok(report)
    }
}

/// Manifest totals are the earlier invocations' plus this one's.
fn record_progress(
    manifest: &mut CollectionManifest,
    base_stats: &RunStats,
    base_failures: &[String],
    report: &CollectionReport,
    records: usize,
) {
    let mut stats = base_stats.clone();
    stats.absorb_collection(&report.stats);
    stats.collected = records;
    manifest.stats = stats;
    manifest.records = records;
    manifest.source_failures = base_failures.iter().chain(&report.source_failures).cloned().collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateRecord;
    use crate::sources::{QueryField, SourcePage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn rec(id: &str, abstract_text: Option<&str>) -> CandidateRecord {
        CandidateRecord {
            external_id: id.into(),
            title: format!("Title {id}"),
            abstract_text: abstract_text.map(String::from),
            authors: vec![],
            publication_year: None,
            publication_date: None,
            venue: None,
            citation_count: 0,
        }
    }

    /// Returns the scripted pages for each query text in order, then empty pages.
    struct PagedSource {
        pages: Vec<(&'static str, Vec<SourcePage>)>,
        requests: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl LiteratureSource for PagedSource {
        async fn search_page(&self, q: &SearchQuery, offset: usize, rows: usize) -> anyhow::Result<SourcePage> {
            self.requests.lock().unwrap().push((q.text.clone(), offset));
            if q.text == "unavailable" {
                anyhow::bail!("HTTP 503");
            }
            let pages = self.pages.iter().find(|(t, _)| *t == q.text).map(|(_, p)| p);
            Ok(pages.and_then(|p| p.get(offset / rows)).cloned().unwrap_or_default())
        }
        fn name(&self) -> &'static str { "paged" }
    }

    fn page(records: Vec<CandidateRecord>) -> SourcePage {
        SourcePage { raw_count: records.len(), records }
    }

    fn group(name: &str, texts: &[&str]) -> QueryGroup {
        QueryGroup {
            name: name.into(),
            queries: texts
                .iter()
                .map(|t| SearchQuery { text: t.to_string(), field: QueryField::Keyword, filter: None })
                .collect(),
        }
    }

    fn config(page_size: usize, target: Option<usize>) -> CollectorConfig {
        CollectorConfig { target, page_size, max_pages_per_query: 10, request_delay: Duration::ZERO }
    }

    #[tokio::test]
    async fn test_short_page_ends_query() {
        let source = Arc::new(PagedSource {
            pages: vec![("kelp", vec![
                page(vec![rec("a", Some("x")), rec("b", Some("x"))]),
                page(vec![rec("c", Some("x"))]),
            ])],
            requests: Mutex::new(vec![]),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);
        let mut session = CollectionSession::new();

        let report = SourceCollector::new(source.clone(), config(2, None))
            .collect(&[group("marine", &["kelp"])], &mut session, &cache, &mut CollectionManifest::default())
            .await
            .unwrap();

        assert_eq!(session.len(), 3);
        assert_eq!(report.stats.pages_fetched, 2);
        let offsets: Vec<usize> = source.requests.lock().unwrap().iter().map(|(_, o)| *o).collect();
        assert_eq!(offsets, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_missing_abstract_and_key_counted() {
        let mut first = page(vec![rec("a", Some("x")), rec("b", None), rec("c", Some("   "))]);
        first.raw_count = 5; // two items had no DOI
        let source = Arc::new(PagedSource { pages: vec![("peat", vec![first])], requests: Mutex::new(vec![]) });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);
        let mut session = CollectionSession::new();

        let report = SourceCollector::new(source, config(10, None))
            .collect(&[group("wetland", &["peat"])], &mut session, &cache, &mut CollectionManifest::default())
            .await
            .unwrap();

        assert_eq!(session.len(), 1);
        assert_eq!(report.stats.skipped_empty_abstract, 2);
        assert_eq!(report.stats.skipped_no_key, 2);
    }

    #[tokio::test]
    async fn test_dedup_across_queries_and_flush_per_group() {
        let source = Arc::new(PagedSource {
            pages: vec![
                ("reef", vec![page(vec![rec("10.1/a", Some("first")), rec("10.1/b", Some("x"))])]),
                ("coral", vec![page(vec![rec("10.1/a", Some("second"))])]),
            ],
            requests: Mutex::new(vec![]),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);
        let mut session = CollectionSession::new();

        let report = SourceCollector::new(source, config(5, None))
            .collect(&[group("reefs", &["reef"]), group("corals", &["coral"])], &mut session, &cache, &mut CollectionManifest::default())
            .await
            .unwrap();

        assert_eq!(session.len(), 2);
        assert_eq!(report.replaced, 1);
        let cached = cache.load().unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].abstract_text.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_source_error_skips_query_only() {
        let source = Arc::new(PagedSource {
            pages: vec![("savanna", vec![page(vec![rec("s1", Some("x"))])])],
            requests: Mutex::new(vec![]),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);
        let mut session = CollectionSession::new();

        let report = SourceCollector::new(source, config(5, None))
            .collect(&[group("dryland", &["unavailable", "savanna"])], &mut session, &cache, &mut CollectionManifest::default())
            .await
            .unwrap();

        assert_eq!(report.stats.source_errors, 1);
        assert_eq!(report.source_failures.len(), 1);
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn test_target_stops_sweep() {
        let source = Arc::new(PagedSource {
            pages: vec![
                ("a", vec![page((0..4).map(|i| rec(&format!("a{i}"), Some("x"))).collect())]),
                ("b", vec![page(vec![rec("b0", Some("x"))])]),
            ],
            requests: Mutex::new(vec![]),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);
        let mut session = CollectionSession::new();

        let report = SourceCollector::new(source.clone(), config(4, Some(3)))
            .collect(&[group("g1", &["a"]), group("g2", &["b"])], &mut session, &cache, &mut CollectionManifest::default())
            .await
            .unwrap();

        assert!(report.target_reached);
        assert_eq!(source.requests.lock().unwrap().len(), 1);
        assert_eq!(cache.load().unwrap().len(), 4);
        assert!(cache.load_manifest().unwrap().unwrap().complete);
    }

    #[tokio::test]
    async fn test_manifest_tracks_each_flushed_group() {
        let source = Arc::new(PagedSource {
            pages: vec![("reef", vec![page(vec![rec("r1", Some("x"))])])],
            requests: Mutex::new(vec![]),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);
        let mut session = CollectionSession::new();
        let mut manifest = CollectionManifest::default();

        SourceCollector::new(source, config(5, None))
            .collect(&[group("reefs", &["reef"]), group("outage", &["unavailable"])], &mut session, &cache, &mut manifest)
            .await
            .unwrap();

        let saved = cache.load_manifest().unwrap().unwrap();
        assert_eq!(saved, manifest);
        assert_eq!(saved.completed_groups, vec!["reefs", "outage"]);
        assert!(saved.complete);
        assert_eq!(saved.records, 1);
        assert_eq!((saved.stats.collected, saved.stats.pages_fetched, saved.stats.source_errors), (1, 1, 1));
        assert_eq!(saved.source_failures.len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_sweep_resumes_at_next_group() {
        let source = Arc::new(PagedSource {
            pages: vec![
                ("reef", vec![page(vec![rec("r1", Some("x")), rec("shared", Some("from reef"))])]),
                ("peat", vec![page(vec![rec("p1", Some("x")), rec("shared", Some("from peat"))])]),
            ],
            requests: Mutex::new(vec![]),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);

        // State left behind by a sweep killed after its first group.
        cache.flush(&[rec("r1", Some("x")), rec("shared", Some("from reef"))]).unwrap();
        let mut manifest = CollectionManifest {
            completed_groups: vec!["reefs".into()],
            records: 2,
            stats: RunStats { collected: 2, pages_fetched: 1, source_errors: 1, ..Default::default() },
            source_failures: vec!["mangrove @ 0: HTTP 503".into()],
            ..Default::default()
        };
        cache.save_manifest(&mut manifest).unwrap();

        let mut session = CollectionSession::from_records(cache.load().unwrap());
        let mut manifest = cache.load_manifest().unwrap().unwrap();
        let report = SourceCollector::new(source.clone(), config(5, None))
            .collect(&[group("reefs", &["reef"]), group("wetlands", &["peat"])], &mut session, &cache, &mut manifest)
            .await
            .unwrap();

        let queried: Vec<String> = source.requests.lock().unwrap().iter().map(|(q, _)| q.clone()).collect();
        assert_eq!(queried, vec!["peat"]);
        assert_eq!(report.skipped_groups, 1);
        assert_eq!(report.replaced, 1);

        let ids: Vec<_> = cache.load().unwrap().iter().map(|r| r.external_id.clone()).collect();
        assert_eq!(ids, vec!["r1", "shared", "p1"]);
        assert!(manifest.complete);
        assert_eq!(manifest.completed_groups, vec!["reefs", "wetlands"]);
        assert_eq!((manifest.stats.collected, manifest.stats.pages_fetched, manifest.stats.source_errors), (3, 2, 1));
        assert_eq!(manifest.source_failures, vec!["mangrove @ 0: HTTP 503"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_paced_by_request_delay() {
        let full = |p: &str| page((0..2).map(|i| rec(&format!("{p}{i}"), Some("x"))).collect());
        let source = Arc::new(PagedSource {
            pages: vec![("kelp", vec![full("k"), full("l")]), ("seagrass", vec![page(vec![rec("s", Some("x"))])])],
            requests: Mutex::new(vec![]),
        });
        let dir = tempfile::tempdir().unwrap();
        let cache = ChunkedCache::new(dir.path(), 10);
        let mut session = CollectionSession::new();
        let delay = Duration::from_millis(750);
        let config = CollectorConfig { request_delay: delay, ..config(2, None) };

        let started = tokio::time::Instant::now();
        SourceCollector::new(source.clone(), config)
            .collect(&[group("marine", &["kelp", "seagrass"])], &mut session, &cache, &mut CollectionManifest::default())
            .await
            .unwrap();

        // kelp @0, kelp @2, kelp @4 (empty), seagrass @0
        let requests = source.requests.lock().unwrap().len();
        assert_eq!(requests, 4);
        assert_eq!(started.elapsed(), delay * (requests as u32 - 1));
    }
}
