use serde::{Deserialize, Serialize};

/// Classification of a single fetch attempt. Every retry and fallback
/// decision in the strategy decorators branches on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Ok,
    InvalidContent,
    NetworkError,
    Censored,
    QuotaExceeded,
}

impl ResponseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseOutcome::Ok => "ok",
            ResponseOutcome::InvalidContent => "invalid_content",
            ResponseOutcome::NetworkError => "network_error",
            ResponseOutcome::Censored => "censored",
            ResponseOutcome::QuotaExceeded => "quota_exceeded",
        }
    }

    /// Human readable label used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseOutcome::Ok => "Ok",
            ResponseOutcome::InvalidContent => "Invalid Response",
            ResponseOutcome::NetworkError => "Network Error",
            ResponseOutcome::Censored => "Censored Content",
            ResponseOutcome::QuotaExceeded => "API Quota Exceeded",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResponseOutcome::Ok)
    }

    /// Only transport level failures are worth repeating at the same route.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResponseOutcome::NetworkError)
    }

    /// Maps an HTTP status to an outcome.
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => ResponseOutcome::Ok,
            429 => ResponseOutcome::QuotaExceeded,
            _ => ResponseOutcome::InvalidContent,
        }
    }
}

impl std::fmt::Display for ResponseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub url: String,
    pub outcome: ResponseOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered record of every attempt made for one logical download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLog {
    attempts: Vec<FetchAttempt>,
}

impl FetchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, url: &str, outcome: ResponseOutcome, error: Option<String>) {
        self.attempts.push(FetchAttempt {
            url: url.to_string(),
            outcome,
            error,
        });
    }

    /// Overrides the classification of the most recent attempt, used by
    /// decorators that validate content after the transport succeeded.
    pub fn reclassify_last(&mut self, outcome: ResponseOutcome, error: Option<String>) {
        if let Some(last) = self.attempts.last_mut() {
            last.outcome = outcome;
            if error.is_some() {
                last.error = error;
            }
        }
    }

    pub fn attempts(&self) -> &[FetchAttempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last_outcome(&self) -> Option<ResponseOutcome> {
        self.attempts.last().map(|a| a.outcome)
    }
}
