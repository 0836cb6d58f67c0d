use super::client::SearchClient;
use super::models::{SearchCategory, SearchQuery, SearchResultItem};
use crate::config::SearchSettings;
use crate::fetch::MemoryCache;
use crate::metrics;
use crate::sites::SiteRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Queries every participating site concurrently. A site that fails or runs
/// past the timeout contributes nothing; the others still answer.
pub struct FederatedSearch {
    registry: Arc<SiteRegistry>,
    client: SearchClient,
    settings: SearchSettings,
    cache: MemoryCache<Vec<SearchResultItem>>,
}

impl FederatedSearch {
    pub fn new(registry: Arc<SiteRegistry>, client: SearchClient, settings: SearchSettings) -> Self {
        Self {
            registry,
            client,
            settings,
            cache: MemoryCache::new(),
        }
    }

    pub async fn search(&self, text: &str, category: SearchCategory, page: u32) -> Vec<SearchResultItem> {
        let query = SearchQuery::new(text, category, page);
        if query.text.is_empty() {
            return Vec::new();
        }

        let key = format!("search:{}:{}:{}", query.category, query.page, query.text);
        if let Some(hit) = self.cache.lookup(&key) {
            debug!(query = %query.text, "Search cache hit");
            return hit;
        }

        let timeout = Duration::from_millis(self.settings.timeout_ms);
        let sites = self.registry.search_sites(&self.settings.sites);
        let tasks = sites.iter().map(|site| {
            let query = &query;
            let client = &self.client;
            async move {
                let name = site.site_name().as_str();
                match tokio::time::timeout(timeout, site.search(query, client)).await {
                    Ok(Ok(items)) => items,
                    Ok(Err(err)) => {
                        warn!(site = name, query = %query.text, "Search failed: {:#}", err);
                        metrics::record_search_failure(name);
                        Vec::new()
                    }
                    Err(_) => {
                        warn!(site = name, query = %query.text, "Search timed out");
                        metrics::record_search_failure(name);
                        Vec::new()
                    }
                }
            }
        });

        let results: Vec<SearchResultItem> = join_all(tasks).await.into_iter().flatten().collect();
        self.cache.store(
            &key,
            results.clone(),
            Duration::from_secs(self.settings.cache_ttl_secs),
        );
        results
    }
}
