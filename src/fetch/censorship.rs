use super::basic::{Fetch, Fetched};
use super::models::{FetchLog, ResponseOutcome};

const UNAVAILABLE_FOR_LEGAL_REASONS: u16 = 451;

/// Marks responses as `Censored` when the source answers with HTTP 451 or
/// serves a page containing one of the configured block-page markers.
pub struct CensorshipFilter<F> {
    inner: F,
    markers: Vec<String>,
}

impl<F: Fetch> CensorshipFilter<F> {
    pub fn new(inner: F, markers: Vec<String>) -> Self {
        Self { inner, markers }
    }
}

impl<F: Fetch> Fetch for CensorshipFilter<F> {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        let mut fetched = self.inner.fetch(url, log);
        let Some(response) = &fetched.response else {
            return fetched;
        };
        let blocked = response.status() == UNAVAILABLE_FOR_LEGAL_REASONS
            || (fetched.outcome.is_ok() && {
                let body = response.text();
                self.markers.iter().any(|m| body.contains(m.as_str()))
            });
        if blocked {
            fetched.outcome = ResponseOutcome::Censored;
            log.reclassify_last(ResponseOutcome::Censored, Some("block page".to_string()));
        }
        fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::basic::BasicFetcher;
    use crate::fetch::testing::ScriptedTransport;
    use crate::fetch::transport::Headers;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_marker_in_body_is_censored() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(200, Some("text/html"), b"<p>This content is not available in your region</p>".to_vec());
        transport.push_response(200, Some("text/html"), b"<p>A regular page</p>".to_vec());
        let filter = CensorshipFilter::new(
            BasicFetcher::new(transport, Headers::new(), Duration::from_secs(1)),
            vec!["not available in your region".to_string()],
        );

        let mut log = FetchLog::new();
        assert_eq!(filter.fetch("https://a", &mut log).outcome, ResponseOutcome::Censored);
        assert_eq!(filter.fetch("https://a", &mut log).outcome, ResponseOutcome::Ok);
        assert_eq!(log.attempts()[0].outcome, ResponseOutcome::Censored);
    }
}
