use super::error::DownloadError;
use super::models::{FetchLog, ResponseOutcome};
use super::replay::{self, ReplayTransport};
use super::response::FetchedResponse;
use super::transport::{FetchRequest, Headers, Transport, TransportError};
use crate::metrics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one logical fetch: the last response seen, if the transport got
/// one at all, and its classification.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub response: Option<FetchedResponse>,
    pub outcome: ResponseOutcome,
}

impl Fetched {
    pub fn new(response: Option<FetchedResponse>, outcome: ResponseOutcome) -> Self {
        Self { response, outcome }
    }

    pub fn network_error() -> Self {
        Self::new(None, ResponseOutcome::NetworkError)
    }
}

/// Anything that can perform a logical download. Strategy decorators wrap one
/// `Fetch` in another.
pub trait Fetch: Send + Sync {
    /// Performs the download, appending every attempt to `log`.
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched;

    /// Downloads `url`, turning anything but `Ok` into a [`DownloadError`].
    fn download(&self, url: &str) -> Result<FetchedResponse, DownloadError> {
        let mut log = FetchLog::new();
        let fetched = self.fetch(url, &mut log);
        match (fetched.outcome, fetched.response) {
            (ResponseOutcome::Ok, Some(response)) => Ok(response),
            (outcome, _) => {
                let outcome = if outcome.is_ok() {
                    ResponseOutcome::NetworkError
                } else {
                    outcome
                };
                warn!(
                    url,
                    outcome = outcome.as_str(),
                    attempts = log.len(),
                    "Download failed: {:?}",
                    log.attempts()
                );
                Err(DownloadError::new(url, outcome, log))
            }
        }
    }
}

impl<F: Fetch + ?Sized> Fetch for Box<F> {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        (**self).fetch(url, log)
    }
}

impl<F: Fetch + ?Sized> Fetch for Arc<F> {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        (**self).fetch(url, log)
    }
}

/// A single request through a [`Transport`], no resilience of its own. When
/// replay mode is on the transport is bypassed in favor of fixture files.
pub struct BasicFetcher {
    transport: Arc<dyn Transport>,
    headers: Headers,
    timeout: Duration,
    save_dir: Option<PathBuf>,
}

impl BasicFetcher {
    pub fn new(transport: Arc<dyn Transport>, headers: Headers, timeout: Duration) -> Self {
        Self {
            transport,
            headers,
            timeout,
            save_dir: None,
        }
    }

    /// Writes every live response body into `dir` under its fixture name.
    pub fn with_save_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.save_dir = dir;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    fn perform(&self, url: &str) -> Result<super::transport::RawResponse, TransportError> {
        let request = FetchRequest {
            url,
            headers: &self.headers,
            timeout: self.timeout,
        };
        match replay::fixture_dir() {
            Some(dir) => ReplayTransport::new(dir).get(&request),
            None => {
                let raw = self.transport.get(&request)?;
                if let Some(save_dir) = &self.save_dir {
                    replay::save_capture(save_dir, url, &raw.body);
                }
                Ok(raw)
            }
        }
    }
}

impl Fetch for BasicFetcher {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        let fetched = match self.perform(url) {
            Ok(raw) => {
                let outcome = ResponseOutcome::from_status(raw.status);
                let error = (!outcome.is_ok()).then(|| format!("HTTP {}", raw.status));
                log.record(url, outcome, error);
                Fetched::new(Some(FetchedResponse::new(raw)), outcome)
            }
            Err(err) => {
                log.record(url, ResponseOutcome::NetworkError, Some(err.to_string()));
                Fetched::network_error()
            }
        };
        debug!(url, outcome = fetched.outcome.as_str(), "Fetch attempt");
        metrics::record_fetch_attempt(fetched.outcome);
        fetched
    }
}
