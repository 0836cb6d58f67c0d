use super::id_type::IdType;
use super::site::{Canonical, Site, SiteTarget};
use crate::config::SiteFilter;
use crate::document::ResourceLink;
use crate::fetch::FetchContext;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use url::{Host, Url};

lazy_static! {
    static ref SHORTENER: Regex =
        Regex::new(r"^https?://(spotify\.link|t\.co|b23\.tv)/.+").unwrap();
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unresolvable URL: {0}")]
    Unresolvable(String),

    #[error("No site registered for id type {0}")]
    UnknownIdType(String),

    #[error("A site for {0} is already registered")]
    DuplicateIdType(IdType),
}

/// A URL or identifier bound to the site responsible for it.
#[derive(Clone)]
pub struct ResolvedSite {
    pub site: Arc<dyn Site>,
    pub target: SiteTarget,
}

impl std::fmt::Debug for ResolvedSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSite")
            .field("site", &self.site.site_name().as_str())
            .field("target", &self.target)
            .finish()
    }
}

pub struct SiteRegistryBuilder {
    sites: Vec<Arc<dyn Site>>,
    canonical_redirect_limit: usize,
}

impl SiteRegistryBuilder {
    pub fn register(mut self, site: Arc<dyn Site>) -> Result<Self, ResolveError> {
        let id_type = site.id_type();
        if self.sites.iter().any(|s| s.id_type() == id_type) {
            return Err(ResolveError::DuplicateIdType(id_type));
        }
        self.sites.push(site);
        Ok(self)
    }

    pub fn canonical_redirect_limit(mut self, limit: usize) -> Self {
        self.canonical_redirect_limit = limit;
        self
    }

    pub fn build(self) -> SiteRegistry {
        let by_id_type = self
            .sites
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id_type(), i))
            .collect();
        SiteRegistry {
            sites: self.sites,
            by_id_type,
            canonical_redirect_limit: self.canonical_redirect_limit,
        }
    }
}

/// Maps URLs and identifiers to sites. Built once, read-only afterwards.
pub struct SiteRegistry {
    sites: Vec<Arc<dyn Site>>,
    by_id_type: HashMap<IdType, usize>,
    canonical_redirect_limit: usize,
}

impl SiteRegistry {
    pub fn builder() -> SiteRegistryBuilder {
        SiteRegistryBuilder {
            sites: Vec::new(),
            canonical_redirect_limit: 3,
        }
    }

    pub fn sites(&self) -> impl Iterator<Item = &Arc<dyn Site>> {
        self.sites.iter()
    }

    pub fn site_for_id(&self, id_type: IdType) -> Option<Arc<dyn Site>> {
        self.by_id_type.get(&id_type).map(|i| self.sites[*i].clone())
    }

    pub fn resolve_id(&self, id_type: IdType, id_value: &str) -> Result<ResolvedSite, ResolveError> {
        let site = self
            .site_for_id(id_type)
            .ok_or_else(|| ResolveError::UnknownIdType(id_type.to_string()))?;
        let url = site.id_to_url(id_value);
        Ok(ResolvedSite {
            site,
            target: SiteTarget {
                id_type,
                id_value: id_value.to_string(),
                url,
            },
        })
    }

    /// Resolves a link by its identifier when a site serves that type,
    /// otherwise by its URL.
    pub fn resolve_link(&self, link: &ResourceLink, fetch: &FetchContext) -> Result<ResolvedSite, ResolveError> {
        match self.resolve_id(link.id_type, &link.id_value) {
            Ok(resolved) => Ok(resolved),
            Err(_) => self.resolve(&link.url, fetch),
        }
    }

    /// First site whose static patterns match, in registration order.
    pub fn match_static(&self, url: &str) -> Option<ResolvedSite> {
        self.sites
            .iter()
            .filter(|s| s.matches(url))
            .find_map(|s| self.bind(s, url))
    }

    /// Resolves an arbitrary URL: static patterns, shortener expansion,
    /// fallback probes, then canonical re-resolution so aliases of one object
    /// converge to one identifier.
    pub fn resolve(&self, url: &str, fetch: &FetchContext) -> Result<ResolvedSite, ResolveError> {
        let mut current = url.trim().to_string();
        for _ in 0..=self.canonical_redirect_limit {
            let resolved = self
                .resolve_once(&current, fetch)
                .ok_or_else(|| ResolveError::Unresolvable(url.to_string()))?;
            match resolved.site.canonicalize(&current, fetch) {
                Canonical::Unchanged => return Ok(resolved),
                Canonical::Reject => {
                    debug!(url, "Site rejected URL without a canonical form");
                    return Err(ResolveError::Unresolvable(url.to_string()));
                }
                Canonical::Alias(next) => {
                    if next == current || self.same_target(&resolved, &next) {
                        return Ok(resolved);
                    }
                    debug!(from = %current, to = %next, "Re-resolving canonical URL");
                    current = next;
                }
            }
        }
        error!(
            url,
            limit = self.canonical_redirect_limit,
            "Too many canonical redirections"
        );
        Err(ResolveError::Unresolvable(url.to_string()))
    }

    pub fn search_sites(&self, filter: &SiteFilter) -> Vec<Arc<dyn Site>> {
        let mut seen = Vec::new();
        let mut sites = Vec::new();
        for site in &self.sites {
            let name = site.site_name();
            if filter.allows(name.as_str()) && !seen.contains(&name) {
                seen.push(name);
                sites.push(site.clone());
            }
        }
        sites
    }

    fn same_target(&self, resolved: &ResolvedSite, url: &str) -> bool {
        self.match_static(url)
            .map(|other| other.target == resolved.target)
            .unwrap_or(false)
    }

    fn bind(&self, site: &Arc<dyn Site>, url: &str) -> Option<ResolvedSite> {
        let id_value = site.url_to_id(url)?;
        Some(ResolvedSite {
            site: site.clone(),
            target: SiteTarget {
                id_type: site.id_type(),
                url: site.id_to_url(&id_value),
                id_value,
            },
        })
    }

    fn resolve_once(&self, url: &str, fetch: &FetchContext) -> Option<ResolvedSite> {
        if !is_acceptable_url(url) {
            return None;
        }
        if let Some(resolved) = self.match_static(url) {
            return Some(resolved);
        }
        if SHORTENER.is_match(url) {
            match fetch.resolve_redirects(url) {
                Ok(expanded) if expanded != url => {
                    if let Some(resolved) = self.match_static(&expanded) {
                        return Some(resolved);
                    }
                }
                Ok(_) => {}
                Err(err) => debug!(url, "Failed to expand short link: {}", err),
            }
        }
        self.sites
            .iter()
            .filter(|s| s.validate_url_fallback(url, fetch))
            .find_map(|s| self.bind(s, url))
    }
}

/// Absolute http(s) URL on a named host without an explicit port.
fn is_acceptable_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    matches!(parsed.scheme(), "http" | "https")
        && matches!(parsed.host(), Some(Host::Domain(_)))
        && parsed.port().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchSettings;
    use crate::document::{ItemKind, NormalizedDocument};
    use crate::fetch::testing::ScriptedTransport;
    use crate::sites::{ScrapeContext, ScrapeError, SiteName};

    struct PatternSite {
        id_type: IdType,
        patterns: Vec<Regex>,
        alias_of: Option<(&'static str, &'static str)>,
        fallback_host: Option<&'static str>,
    }

    impl PatternSite {
        fn new(id_type: IdType, patterns: &[&str]) -> Self {
            Self {
                id_type,
                patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
                alias_of: None,
                fallback_host: None,
            }
        }
    }

    impl Site for PatternSite {
        fn site_name(&self) -> SiteName {
            SiteName::Itch
        }

        fn id_type(&self) -> IdType {
            self.id_type
        }

        fn url_patterns(&self) -> &[Regex] {
            &self.patterns
        }

        fn default_kind(&self) -> Option<ItemKind> {
            Some(ItemKind::Game)
        }

        fn id_to_url(&self, id_value: &str) -> String {
            format!("https://{id_value}")
        }

        fn url_to_id(&self, url: &str) -> Option<String> {
            if let Some(host) = self.fallback_host {
                if url.contains(host) {
                    return Some(url.trim_start_matches("https://").to_string());
                }
            }
            self.patterns
                .iter()
                .find_map(|p| p.captures(url))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        }

        fn validate_url_fallback(&self, url: &str, _fetch: &FetchContext) -> bool {
            self.fallback_host.map(|h| url.contains(h)).unwrap_or(false)
        }

        fn canonicalize(&self, url: &str, _fetch: &FetchContext) -> Canonical {
            match self.alias_of {
                Some((alias, canonical)) if url.contains(alias) => {
                    Canonical::Alias(canonical.to_string())
                }
                _ => Canonical::Unchanged,
            }
        }

        fn scrape(
            &self,
            _target: &SiteTarget,
            _ctx: &ScrapeContext<'_>,
        ) -> Result<NormalizedDocument, ScrapeError> {
            Err(ScrapeError::Unsupported("test".into()))
        }
    }

    fn fetch_context() -> (Arc<ScriptedTransport>, FetchContext) {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = FetchContext::new(transport.clone(), FetchSettings::default());
        (transport, ctx)
    }

    #[test]
    fn test_duplicate_id_type_is_rejected() {
        let result = SiteRegistry::builder()
            .register(Arc::new(PatternSite::new(IdType::Itch, &[r"^https://a/(\w+)"])))
            .unwrap()
            .register(Arc::new(PatternSite::new(IdType::Itch, &[r"^https://b/(\w+)"])));
        assert!(matches!(result, Err(ResolveError::DuplicateIdType(IdType::Itch))));
    }

    #[test]
    fn test_first_registered_pattern_wins() {
        let (_, fetch) = fetch_context();
        let registry = SiteRegistry::builder()
            .register(Arc::new(PatternSite::new(IdType::Bangumi, &[r"^https://shared\.example/(\d+)"])))
            .unwrap()
            .register(Arc::new(PatternSite::new(IdType::Itch, &[r"^https://shared\.example/(\w+)"])))
            .unwrap()
            .build();

        let resolved = registry.resolve("https://shared.example/42", &fetch).unwrap();
        assert_eq!(resolved.target.id_type, IdType::Bangumi);
        assert_eq!(resolved.target.id_value, "42");
        assert_eq!(resolved.target.url, "https://42");

        let resolved = registry.resolve("https://shared.example/abc", &fetch).unwrap();
        assert_eq!(resolved.target.id_type, IdType::Itch);
    }

    #[test]
    fn test_invalid_urls_are_unresolvable() {
        let (_, fetch) = fetch_context();
        let registry = SiteRegistry::builder()
            .register(Arc::new(PatternSite::new(IdType::Itch, &[r"^.*/(\d+)$"])))
            .unwrap()
            .build();
        for url in ["not a url", "ftp://host.example/1", "https://127.0.0.1/1", "https://host.example:8080/1"] {
            assert!(
                matches!(registry.resolve(url, &fetch), Err(ResolveError::Unresolvable(_))),
                "{url} should not resolve"
            );
        }
    }

    #[test]
    fn test_fallback_runs_only_without_static_match() {
        let (_, fetch) = fetch_context();
        let mut probing = PatternSite::new(IdType::Fediverse, &[]);
        probing.fallback_host = Some("instance.example");
        let registry = SiteRegistry::builder()
            .register(Arc::new(PatternSite::new(IdType::Itch, &[r"^https://static\.example/(\d+)"])))
            .unwrap()
            .register(Arc::new(probing))
            .unwrap()
            .build();

        let resolved = registry.resolve("https://instance.example/book/1", &fetch).unwrap();
        assert_eq!(resolved.target.id_type, IdType::Fediverse);
        assert_eq!(resolved.target.id_value, "instance.example/book/1");

        assert!(registry.resolve("https://elsewhere.example/1", &fetch).is_err());
    }

    #[test]
    fn test_alias_is_re_resolved_to_canonical() {
        let (_, fetch) = fetch_context();
        let mut site = PatternSite::new(IdType::Itch, &[r"^https://games\.example/(?:embed/)?(\w+)"]);
        site.alias_of = Some(("/embed/", "https://games.example/celeste"));
        let registry = SiteRegistry::builder().register(Arc::new(site)).unwrap().build();

        let resolved = registry.resolve("https://games.example/embed/123", &fetch).unwrap();
        assert_eq!(resolved.target.id_value, "celeste");
    }

    #[test]
    fn test_shortener_is_expanded() {
        let (transport, fetch) = fetch_context();
        transport.redirect("https://t.co/xyz", "https://static.example/77");
        let registry = SiteRegistry::builder()
            .register(Arc::new(PatternSite::new(IdType::Itch, &[r"^https://static\.example/(\d+)"])))
            .unwrap()
            .build();

        let resolved = registry.resolve("https://t.co/xyz", &fetch).unwrap();
        assert_eq!(resolved.target.id_value, "77");
    }

    #[test]
    fn test_resolve_id_and_unknown_type() {
        let registry = SiteRegistry::builder()
            .register(Arc::new(PatternSite::new(IdType::Itch, &[r"^https://a/(\w+)"])))
            .unwrap()
            .build();
        let resolved = registry.resolve_id(IdType::Itch, "x.itch.io/y").unwrap();
        assert_eq!(resolved.target.url, "https://x.itch.io/y");
        assert!(matches!(
            registry.resolve_id(IdType::Isbn, "9780441172719"),
            Err(ResolveError::UnknownIdType(_))
        ));
    }
}
