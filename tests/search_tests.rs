//! Integration tests for federated search
//!
//! Stub sites answer, fail or hang; the aggregate must still arrive within
//! the timeout with whatever answered.

mod common;

use catalog_harvest::config::{ApiKeys, SearchSettings, SiteFilter};
use catalog_harvest::document::ItemKind;
use catalog_harvest::search::{FederatedSearch, SearchCategory, SearchClient, SearchResultItem};
use catalog_harvest::sites::{IdType, SiteName, SiteRegistry};
use common::{StubSearch, StubSite, MIRROR_HOST, MOVIE_HOST};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct SearchHarness {
    answering: Arc<StubSite>,
    failing: Arc<StubSite>,
    hanging: Arc<StubSite>,
    search: FederatedSearch,
}

fn hit(title: &str) -> SearchResultItem {
    SearchResultItem {
        category: Some(ItemKind::Movie),
        source_site: "tmdb".to_string(),
        url: format!("https://{MOVIE_HOST}/item/{}", title.to_lowercase()),
        title: title.to_string(),
        subtitle: String::new(),
        brief: String::new(),
        cover_url: None,
    }
}

fn harness(sites: SiteFilter) -> SearchHarness {
    let answering = Arc::new(
        StubSite::new(SiteName::Tmdb, IdType::TmdbMovie, ItemKind::Movie, MOVIE_HOST)
            .with_search(StubSearch::Results(vec![hit("Alien"), hit("Aliens")])),
    );
    let failing = Arc::new(
        StubSite::new(SiteName::Bangumi, IdType::Bangumi, ItemKind::Movie, MIRROR_HOST)
            .with_search(StubSearch::Fail),
    );
    let hanging = Arc::new(
        StubSite::new(SiteName::Itch, IdType::Itch, ItemKind::Game, "games.stub.test")
            .with_search(StubSearch::Hang),
    );
    let registry = SiteRegistry::builder()
        .register(answering.clone())
        .and_then(|b| b.register(failing.clone()))
        .and_then(|b| b.register(hanging.clone()))
        .unwrap()
        .build();
    let client = SearchClient::new(
        Duration::from_secs(1),
        "catalog-harvest-tests",
        ApiKeys::default(),
        vec!["en".to_string()],
    )
    .unwrap();
    let settings = SearchSettings {
        timeout_ms: 200,
        sites,
        cache_ttl_secs: 60,
    };

    SearchHarness {
        answering,
        failing,
        hanging,
        search: FederatedSearch::new(Arc::new(registry), client, settings),
    }
}

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn test_failing_and_slow_sites_do_not_block_results() {
    let h = harness(SiteFilter::All);

    let started = Instant::now();
    let results = h.search.search("alien", SearchCategory::All, 1).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Alien", "Aliens"]);
    assert_eq!(h.answering.search_count(), 1);
    assert_eq!(h.failing.search_count(), 1);
    assert_eq!(h.hanging.search_count(), 1);
}

#[tokio::test]
async fn test_repeated_query_is_served_from_cache() {
    let h = harness(SiteFilter::All);

    let first = h.search.search("alien", SearchCategory::All, 1).await;
    let second = h.search.search("alien", SearchCategory::All, 1).await;

    assert_eq!(first, second);
    assert_eq!(h.answering.search_count(), 1);
}

#[tokio::test]
async fn test_different_page_is_not_cached() {
    let h = harness(SiteFilter::All);

    h.search.search("alien", SearchCategory::All, 1).await;
    h.search.search("alien", SearchCategory::All, 2).await;

    assert_eq!(h.answering.search_count(), 2);
}

#[tokio::test]
async fn test_blank_query_asks_nobody() {
    let h = harness(SiteFilter::All);

    let results = h.search.search("   ", SearchCategory::All, 1).await;

    assert!(results.is_empty());
    assert_eq!(h.answering.search_count(), 0);
}

// =============================================================================
// Site Filter
// =============================================================================

#[tokio::test]
async fn test_site_filter_limits_participants() {
    let h = harness(SiteFilter::Only(vec!["tmdb".to_string()]));

    let results = h.search.search("alien", SearchCategory::Movie, 1).await;

    assert_eq!(results.len(), 2);
    assert_eq!(h.failing.search_count(), 0);
    assert_eq!(h.hanging.search_count(), 0);
}

#[tokio::test]
async fn test_site_filter_nothing_disables_search() {
    let h = harness(SiteFilter::Nothing);

    let results = h.search.search("alien", SearchCategory::All, 1).await;

    assert!(results.is_empty());
    assert_eq!(h.answering.search_count(), 0);
}
