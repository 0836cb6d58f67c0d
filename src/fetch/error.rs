use super::models::{FetchLog, ResponseOutcome};
use thiserror::Error;

/// Terminal failure of one logical download. Callers branch on `outcome`.
#[derive(Debug, Clone, Error)]
#[error("Download Failed: {}, {url}", .outcome.label())]
pub struct DownloadError {
    pub url: String,
    pub outcome: ResponseOutcome,
    pub log: FetchLog,
}

impl DownloadError {
    pub fn new(url: &str, outcome: ResponseOutcome, log: FetchLog) -> Self {
        Self {
            url: url.to_string(),
            outcome,
            log,
        }
    }

    pub fn attempts(&self) -> usize {
        self.log.len()
    }
}

/// Failure turning a successful response body into structured data.
#[derive(Debug, Error)]
pub enum ResponseParseError {
    #[error("Response from {url} is not valid JSON: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}
