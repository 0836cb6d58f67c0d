//! Acquirer wiring over in-memory storage and stub sites.

use super::constants::*;
use super::stub_site::StubSite;
use catalog_harvest::config::{FetchSettings, ResolverSettings};
use catalog_harvest::document::ItemKind;
use catalog_harvest::fetch::testing::ScriptedTransport;
use catalog_harvest::sites::{IdType, SiteName, SiteRegistry};
use catalog_harvest::{Acquirer, CatalogStore, FetchContext, SqliteCatalogStore};
use std::sync::Arc;
use std::time::Duration;

/// One acquirer with four stub sites: two movie sources, shows and seasons.
pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<SqliteCatalogStore>,
    pub movies: Arc<StubSite>,
    pub mirror: Arc<StubSite>,
    pub shows: Arc<StubSite>,
    pub seasons: Arc<StubSite>,
    pub acquirer: Acquirer,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(ResolverSettings::default(), Duration::ZERO)
    }

    pub fn with_settings(settings: ResolverSettings) -> Self {
        Self::build(settings, Duration::ZERO)
    }

    /// Movie scrapes take `delay`, so concurrent acquisitions overlap.
    pub fn with_slow_movies(delay: Duration) -> Self {
        Self::build(ResolverSettings::default(), delay)
    }

    fn build(settings: ResolverSettings, movie_delay: Duration) -> Self {
        let movies = Arc::new(
            StubSite::new(SiteName::Tmdb, IdType::TmdbMovie, ItemKind::Movie, MOVIE_HOST)
                .with_scrape_delay(movie_delay),
        );
        let mirror = Arc::new(StubSite::new(
            SiteName::Bangumi,
            IdType::Bangumi,
            ItemKind::Movie,
            MIRROR_HOST,
        ));
        let shows = Arc::new(StubSite::new(
            SiteName::Tmdb,
            IdType::TmdbTv,
            ItemKind::TvShow,
            SHOW_HOST,
        ));
        let seasons = Arc::new(StubSite::new(
            SiteName::Tmdb,
            IdType::TmdbTvSeason,
            ItemKind::TvSeason,
            SEASON_HOST,
        ));

        let registry = SiteRegistry::builder()
            .canonical_redirect_limit(settings.canonical_redirect_limit)
            .register(movies.clone())
            .and_then(|b| b.register(mirror.clone()))
            .and_then(|b| b.register(shows.clone()))
            .and_then(|b| b.register(seasons.clone()))
            .unwrap()
            .build();

        let transport = Arc::new(ScriptedTransport::new());
        let fetch = FetchContext::new(
            transport.clone(),
            FetchSettings {
                retry_backoff_ms: 0,
                ..Default::default()
            },
        );
        let store = Arc::new(SqliteCatalogStore::in_memory().unwrap());
        let acquirer = Acquirer::new(
            Arc::new(registry),
            fetch,
            store.clone() as Arc<dyn CatalogStore>,
            settings,
        );

        Self {
            transport,
            store,
            movies,
            mirror,
            shows,
            seasons,
            acquirer,
        }
    }
}
