//! Proxy decorator: walks an ordered list of proxy templates and falls back to
//! a dedicated backup route when a source looks censored.

use super::basic::{Fetch, Fetched};
use super::models::{FetchLog, ResponseOutcome};
use tracing::{debug, info};

/// Placeholder replaced by the percent-encoded target URL in a template.
pub const URL_PLACEHOLDER: &str = "__URL__";

pub fn apply_template(template: &str, url: &str) -> String {
    template.replace(URL_PLACEHOLDER, &urlencoding::encode(url))
}

pub struct ProxiedFetcher<F> {
    inner: F,
    proxies: Vec<String>,
    backup_proxy: Option<String>,
}

impl<F: Fetch> ProxiedFetcher<F> {
    pub fn new(inner: F, proxies: Vec<String>, backup_proxy: Option<String>) -> Self {
        Self {
            inner,
            proxies,
            backup_proxy,
        }
    }

    fn routes(&self, url: &str) -> Vec<String> {
        if self.proxies.is_empty() {
            vec![url.to_string()]
        } else {
            self.proxies
                .iter()
                .map(|template| apply_template(template, url))
                .collect()
        }
    }

    /// One final attempt through the backup route, if one is configured.
    fn via_backup(&self, url: &str, log: &mut FetchLog) -> Option<Fetched> {
        let backup = self.backup_proxy.as_ref()?;
        Some(self.inner.fetch(&apply_template(backup, url), log))
    }
}

impl<F: Fetch> Fetch for ProxiedFetcher<F> {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        let mut last = Fetched::network_error();
        for route in self.routes(url) {
            last = self.inner.fetch(&route, log);
            match last.outcome {
                ResponseOutcome::Ok | ResponseOutcome::InvalidContent => return last,
                ResponseOutcome::Censored => {
                    info!(url, "Censored response, trying backup proxy");
                    return self.via_backup(url, log).unwrap_or(last);
                }
                ResponseOutcome::NetworkError | ResponseOutcome::QuotaExceeded => {
                    debug!(url, route = %route, outcome = last.outcome.as_str(), "Proxy failed");
                }
            }
        }
        if last.outcome == ResponseOutcome::NetworkError && !self.proxies.is_empty() {
            info!(url, "All proxies unreachable, trying backup proxy");
            return self.via_backup(url, log).unwrap_or(last);
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::basic::BasicFetcher;
    use crate::fetch::censorship::CensorshipFilter;
    use crate::fetch::testing::ScriptedTransport;
    use crate::fetch::transport::Headers;
    use std::sync::Arc;
    use std::time::Duration;

    const TARGET: &str = "https://site.example/item/1";

    fn basic(transport: Arc<ScriptedTransport>) -> BasicFetcher {
        BasicFetcher::new(transport, Headers::new(), Duration::from_secs(1))
    }

    #[test]
    fn test_template_encodes_target() {
        assert_eq!(
            apply_template("https://proxy.example/?url=__URL__", "https://a.b/c?d=1"),
            "https://proxy.example/?url=https%3A%2F%2Fa.b%2Fc%3Fd%3D1"
        );
    }

    #[test]
    fn test_no_proxies_fetches_directly() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(200);
        let fetcher = ProxiedFetcher::new(basic(transport.clone()), vec![], None);
        fetcher.download(TARGET).unwrap();
        assert_eq!(transport.requests()[0].url, TARGET);
    }

    #[test]
    fn test_advances_on_network_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_failure();
        transport.push_status(200);
        let fetcher = ProxiedFetcher::new(
            basic(transport.clone()),
            vec!["https://p1/__URL__".into(), "https://p2/__URL__".into()],
            None,
        );
        fetcher.download(TARGET).unwrap();
        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert!(urls[0].starts_with("https://p1/"));
        assert!(urls[1].starts_with("https://p2/"));
    }

    #[test]
    fn test_invalid_content_stops_the_walk() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(404);
        transport.push_status(200);
        let fetcher = ProxiedFetcher::new(
            basic(transport.clone()),
            vec!["https://p1/__URL__".into(), "https://p2/__URL__".into()],
            None,
        );
        let err = fetcher.download(TARGET).unwrap_err();
        assert_eq!(err.outcome, ResponseOutcome::InvalidContent);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_censored_goes_to_backup_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_failure();
        transport.push_status(451);
        transport.push_status(200);
        let fetcher = ProxiedFetcher::new(
            CensorshipFilter::new(basic(transport.clone()), vec![]),
            vec!["https://p1/__URL__".into(), "https://p2/__URL__".into()],
            Some("https://backup/__URL__".into()),
        );

        let mut log = FetchLog::new();
        let fetched = fetcher.fetch(TARGET, &mut log);

        assert_eq!(fetched.outcome, ResponseOutcome::Ok);
        assert_eq!(transport.request_count(), 3);
        assert!(transport.requests()[2].url.starts_with("https://backup/"));
        let outcomes: Vec<ResponseOutcome> = log.attempts().iter().map(|a| a.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                ResponseOutcome::NetworkError,
                ResponseOutcome::Censored,
                ResponseOutcome::Ok
            ]
        );
    }

    #[test]
    fn test_exhausted_proxies_fall_back_to_backup_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_failure();
        transport.push_failure();
        transport.push_status(200);
        let fetcher = ProxiedFetcher::new(
            basic(transport.clone()),
            vec!["https://p1/__URL__".into(), "https://p2/__URL__".into()],
            Some("https://backup/__URL__".into()),
        );

        let response = fetcher.download(TARGET).unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(transport.request_count(), 3);
        assert!(transport.requests()[2].url.starts_with("https://backup/"));
    }

    #[test]
    fn test_exhausted_proxies_without_backup_fail() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_failure();
        transport.push_failure();
        let fetcher = ProxiedFetcher::new(
            basic(transport.clone()),
            vec!["https://p1/__URL__".into(), "https://p2/__URL__".into()],
            None,
        );
        let err = fetcher.download(TARGET).unwrap_err();
        assert_eq!(err.outcome, ResponseOutcome::NetworkError);
        assert_eq!(err.attempts(), 2);
    }

    #[test]
    fn test_backup_result_is_final() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(451);
        transport.push_status(451);
        transport.push_status(200);
        let fetcher = ProxiedFetcher::new(
            CensorshipFilter::new(basic(transport.clone()), vec![]),
            vec!["https://p1/__URL__".into(), "https://p2/__URL__".into()],
            Some("https://backup/__URL__".into()),
        );
        let err = fetcher.download(TARGET).unwrap_err();
        assert_eq!(err.outcome, ResponseOutcome::Censored);
        assert_eq!(transport.request_count(), 2);
    }
}
