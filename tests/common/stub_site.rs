//! A scriptable site for exercising acquisition and search.

use async_trait::async_trait;
use catalog_harvest::document::{ItemKind, NormalizedDocument, ResourceLink};
use catalog_harvest::search::{SearchClient, SearchQuery, SearchResultItem};
use catalog_harvest::sites::{IdType, ScrapeContext, ScrapeError, Site, SiteName, SiteTarget};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum StubPage {
    Found(NormalizedDocument),
    Untitled,
}

/// How the stub answers federated searches.
#[derive(Clone)]
pub enum StubSearch {
    Results(Vec<SearchResultItem>),
    Fail,
    /// Never answers within any reasonable timeout.
    Hang,
}

/// Serves documents registered with [`add_page`](Self::add_page) for URLs of
/// the form `https://{host}/item/{id}`. Ids without a page fail to scrape.
pub struct StubSite {
    name: SiteName,
    id_type: IdType,
    kind: ItemKind,
    host: String,
    patterns: Vec<Regex>,
    pages: Mutex<HashMap<String, StubPage>>,
    scrape_delay: Duration,
    scrapes: AtomicUsize,
    searches: AtomicUsize,
    search: Mutex<StubSearch>,
}

impl StubSite {
    pub fn new(name: SiteName, id_type: IdType, kind: ItemKind, host: &str) -> Self {
        let pattern = format!(r"^https://{}/item/([\w\-]+)$", regex::escape(host));
        Self {
            name,
            id_type,
            kind,
            host: host.to_string(),
            patterns: vec![Regex::new(&pattern).unwrap()],
            pages: Mutex::new(HashMap::new()),
            scrape_delay: Duration::ZERO,
            scrapes: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            search: Mutex::new(StubSearch::Results(Vec::new())),
        }
    }

    /// Makes every scrape take at least `delay`.
    pub fn with_scrape_delay(mut self, delay: Duration) -> Self {
        self.scrape_delay = delay;
        self
    }

    pub fn with_search(self, search: StubSearch) -> Self {
        *self.search.lock().unwrap() = search;
        self
    }

    pub fn add_page(&self, id: &str, document: NormalizedDocument) {
        self.pages
            .lock()
            .unwrap()
            .insert(id.to_string(), StubPage::Found(document));
    }

    /// A page that exists but has no title.
    pub fn add_untitled_page(&self, id: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(id.to_string(), StubPage::Untitled);
    }

    pub fn url_for(&self, id: &str) -> String {
        format!("https://{}/item/{}", self.host, id)
    }

    pub fn link(&self, id: &str) -> ResourceLink {
        ResourceLink::new(self.id_type, id, self.url_for(id))
    }

    pub fn scrape_count(&self) -> usize {
        self.scrapes.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Site for StubSite {
    fn site_name(&self) -> SiteName {
        self.name
    }

    fn id_type(&self) -> IdType {
        self.id_type
    }

    fn url_patterns(&self) -> &[Regex] {
        &self.patterns
    }

    fn default_kind(&self) -> Option<ItemKind> {
        Some(self.kind)
    }

    fn id_to_url(&self, id_value: &str) -> String {
        self.url_for(id_value)
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        _ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError> {
        self.scrapes.fetch_add(1, Ordering::SeqCst);
        if !self.scrape_delay.is_zero() {
            std::thread::sleep(self.scrape_delay);
        }
        match self.pages.lock().unwrap().get(&target.id_value) {
            Some(StubPage::Found(document)) => Ok(document.clone()),
            Some(StubPage::Untitled) => Err(ScrapeError::MissingField("title")),
            None => Err(ScrapeError::parse(&target.url, "page not found")),
        }
    }

    async fn search(
        &self,
        _query: &SearchQuery,
        _client: &SearchClient,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let behavior = self.search.lock().unwrap().clone();
        match behavior {
            StubSearch::Results(items) => Ok(items),
            StubSearch::Fail => anyhow::bail!("stub search is down"),
            StubSearch::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
        }
    }
}
