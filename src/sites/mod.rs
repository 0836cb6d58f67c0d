//! External sources: the scraper contract, the registry that maps URLs to
//! scrapers, and the adapters for each supported source.

pub mod bangumi;
pub mod fedi;
pub mod google_books;
pub mod html;
mod id_type;
pub mod imdb;
pub mod itch;
pub mod musicbrainz;
mod registry;
mod site;
pub mod tmdb;

pub use id_type::{IdType, SiteName};
pub use registry::{ResolveError, ResolvedSite, SiteRegistry, SiteRegistryBuilder};
pub use site::{
    required, Canonical, DependencyResolver, ScrapeContext, ScrapeError, Site, SiteTarget,
};

use crate::config::ResolverSettings;
use std::sync::Arc;

/// The registry of every built-in site. Static patterns are tried in this
/// order; fallback probes run in this order too.
pub fn build_registry(settings: &ResolverSettings) -> Result<SiteRegistry, ResolveError> {
    Ok(SiteRegistry::builder()
        .canonical_redirect_limit(settings.canonical_redirect_limit)
        .register(Arc::new(tmdb::TmdbMovie))?
        .register(Arc::new(tmdb::TmdbTv))?
        .register(Arc::new(tmdb::TmdbTvSeason))?
        .register(Arc::new(tmdb::TmdbTvEpisode))?
        .register(Arc::new(imdb::Imdb))?
        .register(Arc::new(google_books::GoogleBooks))?
        .register(Arc::new(bangumi::Bangumi))?
        .register(Arc::new(musicbrainz::MusicBrainz))?
        .register(Arc::new(itch::Itch::default()))?
        .register(Arc::new(fedi::Fediverse::default()))?
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_site_round_trips_its_ids() {
        let registry = build_registry(&ResolverSettings::default()).unwrap();
        let samples = [
            (IdType::TmdbMovie, "603"),
            (IdType::TmdbTv, "1399"),
            (IdType::TmdbTvSeason, "1399-2"),
            (IdType::TmdbTvEpisode, "1399-2-5"),
            (IdType::Imdb, "tt0133093"),
            (IdType::GoogleBooks, "B1hSG45JCX4C"),
            (IdType::Bangumi, "228"),
            (IdType::MusicBrainz, "1249b0d1-64b4-4e09-ab4b-e875746cc062"),
            (IdType::Itch, "maddymakesgames.itch.io/celeste"),
            (IdType::Fediverse, "https://neodb.example/book/1a2b3c"),
        ];
        for (id_type, id_value) in samples {
            let site = registry.site_for_id(id_type).unwrap();
            let url = site.id_to_url(id_value);
            assert_eq!(
                site.url_to_id(&url).as_deref(),
                Some(id_value),
                "{id_type} did not round trip through {url}"
            );
        }
    }

    #[test]
    fn test_every_site_type_is_registered_once() {
        let registry = build_registry(&ResolverSettings::default()).unwrap();
        assert_eq!(registry.sites().count(), 10);
    }
}
