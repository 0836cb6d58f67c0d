//! The network boundary: one request in, one raw response out.

use reqwest::blocking::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Request headers keyed by lower-case name.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(url: &str, status: u16, content_type: Option<&str>, body: Vec<u8>) -> Self {
        Self {
            url: url.to_string(),
            status,
            content_type: content_type.map(str::to_string),
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub headers: &'a Headers,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Transport error: {0}")]
    Other(String),
}

pub trait Transport: Send + Sync {
    fn get(&self, request: &FetchRequest<'_>) -> Result<RawResponse, TransportError>;

    /// Follows redirects for `url` and returns where they end.
    fn resolve_redirects(&self, url: &str, timeout: Duration) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() || err.is_request() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

impl Transport for HttpTransport {
    fn get(&self, request: &FetchRequest<'_>) -> Result<RawResponse, TransportError> {
        let mut builder = self.client.get(request.url).timeout(request.timeout);
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().map_err(classify_reqwest_error)?;

        let url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().map_err(classify_reqwest_error)?.to_vec();

        Ok(RawResponse {
            url,
            status,
            content_type,
            body,
        })
    }

    fn resolve_redirects(&self, url: &str, timeout: Duration) -> Result<String, TransportError> {
        let response = self
            .client
            .head(url)
            .timeout(timeout)
            .send()
            .map_err(classify_reqwest_error)?;
        Ok(response.url().to_string())
    }
}
