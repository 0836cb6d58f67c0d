use super::error::ResponseParseError;
use super::transport::RawResponse;
use scraper::Html;
use serde::de::DeserializeOwned;
use std::borrow::Cow;

/// A successful response, with accessors for the formats scrapers consume.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    raw: RawResponse,
}

impl FetchedResponse {
    pub fn new(raw: RawResponse) -> Self {
        Self { raw }
    }

    pub fn url(&self) -> &str {
        &self.raw.url
    }

    pub fn status(&self) -> u16 {
        self.raw.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.raw.content_type.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.raw.body
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.raw.body
    }

    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw.body)
    }

    pub fn as_json<T: DeserializeOwned>(&self) -> Result<T, ResponseParseError> {
        serde_json::from_slice(&self.raw.body).map_err(|source| ResponseParseError::Json {
            url: self.raw.url.clone(),
            source,
        })
    }

    pub fn as_json_value(&self) -> Result<serde_json::Value, ResponseParseError> {
        self.as_json()
    }

    pub fn as_html(&self) -> Html {
        Html::parse_document(&self.text())
    }

    /// Parses markup that is expected to be XML. The tolerant HTML5 parser is
    /// used, so element names come back lower-cased.
    pub fn as_xml(&self) -> Html {
        Html::parse_fragment(&self.text())
    }
}
