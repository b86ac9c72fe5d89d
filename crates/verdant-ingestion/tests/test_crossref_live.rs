//! Test the CrossRef client against the live API.
//!
//! Run with: cargo test --package verdant-ingestion --test test_crossref_live -- --ignored --nocapture

use std::time::Duration;

use chrono::NaiveDate;
use verdant_ingestion::sources::crossref::CrossRefClient;
use verdant_ingestion::sources::{DateFilter, LiteratureSource, QueryField, SearchQuery};

#[tokio::test]
#[ignore] // Requires network access
async fn test_crossref_search_pollinators() {
    let client = CrossRefClient::new("verdant-tests@example.org", Duration::from_secs(30)).unwrap();
    let query = SearchQuery {
        text: "pollinator decline agricultural landscapes".into(),
        field: QueryField::Keyword,
        filter: Some(DateFilter::Published {
            from: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            until: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
        }),
    };

    let page = client.search_page(&query, 0, 5).await.expect("CrossRef search failed");

    println!("Raw items: {}, kept: {}", page.raw_count, page.records.len());
    for r in &page.records {
        println!("\n---");
        println!("DOI:   {}", r.external_id);
        println!("Title: {}", r.title);
        println!("Year:  {:?}", r.publication_year);
    }

    assert!(!page.records.is_empty(), "Should find at least one paper");
    for r in &page.records {
        assert_eq!(r.external_id, r.external_id.to_lowercase());
        assert!(r.has_abstract());
    }
}
