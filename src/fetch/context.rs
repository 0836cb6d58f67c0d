use super::basic::BasicFetcher;
use super::cached::{CachedFetcher, MemoryCache, ResponseCache};
use super::censorship::CensorshipFilter;
use super::image_validator::ImageValidator;
use super::proxied::ProxiedFetcher;
use super::retry::{RetryFetcher, RetryPolicy};
use super::transport::{Headers, RawResponse, Transport, TransportError};
use crate::config::FetchSettings;
use std::sync::Arc;
use std::time::Duration;

/// Everything a scraper needs to build its fetch composition: the transport,
/// the shared response cache and the configured defaults.
#[derive(Clone)]
pub struct FetchContext {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn ResponseCache>,
    settings: FetchSettings,
}

impl FetchContext {
    pub fn new(transport: Arc<dyn Transport>, settings: FetchSettings) -> Self {
        Self {
            transport,
            cache: Arc::new(MemoryCache::<RawResponse>::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn default_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert("user-agent".into(), self.settings.user_agent.clone());
        headers.insert(
            "accept".into(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".into(),
        );
        headers.insert(
            "accept-language".into(),
            self.settings.accept_language.clone(),
        );
        headers.insert("dnt".into(), "1".into());
        headers.insert("upgrade-insecure-requests".into(), "1".into());
        headers.insert("cache-control".into(), "no-cache".into());
        headers
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    pub fn basic(&self) -> BasicFetcher {
        BasicFetcher::new(self.transport.clone(), self.default_headers(), self.timeout())
            .with_save_dir(self.settings.save_dir.clone())
    }

    /// Basic fetch with a shorter timeout, for live probes during URL
    /// resolution.
    pub fn probe(&self) -> BasicFetcher {
        BasicFetcher::new(
            self.transport.clone(),
            self.default_headers(),
            Duration::from_secs(self.settings.probe_timeout_secs),
        )
    }

    pub fn retrying(&self) -> RetryFetcher<BasicFetcher> {
        RetryFetcher::new(self.basic(), RetryPolicy::new(&self.settings))
    }

    pub fn proxied(&self, block_markers: Vec<String>) -> ProxiedFetcher<CensorshipFilter<BasicFetcher>> {
        ProxiedFetcher::new(
            CensorshipFilter::new(self.basic(), block_markers),
            self.settings.proxies.clone(),
            self.settings.backup_proxy.clone(),
        )
    }

    pub fn cached(&self, inner: BasicFetcher) -> CachedFetcher<BasicFetcher> {
        CachedFetcher::new(
            inner,
            self.cache.clone(),
            Duration::from_secs(self.settings.cache_ttl_secs),
        )
    }

    pub fn image(&self, referer: Option<&str>) -> ImageValidator<BasicFetcher> {
        let mut basic = self.basic();
        if let Some(referer) = referer {
            basic = basic.with_header("referer", referer);
        }
        ImageValidator::new(basic)
    }

    pub fn resolve_redirects(&self, url: &str) -> Result<String, TransportError> {
        if super::replay::is_enabled() {
            return Ok(url.to_string());
        }
        self.transport
            .resolve_redirects(url, Duration::from_secs(self.settings.probe_timeout_secs))
    }
}
