use super::id_type::{IdType, SiteName};
use super::registry::SiteRegistry;
use crate::acquisition::AcquireError;
use crate::catalog_store::ExternalResource;
use crate::config::ApiKeys;
use crate::document::{ItemKind, NormalizedDocument, ResourceLink};
use crate::fetch::{DownloadError, FetchContext, ResponseParseError};
use crate::search::{SearchClient, SearchQuery, SearchResultItem};
use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Missing mandatory field \"{0}\"")]
    MissingField(&'static str),

    #[error("Unable to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("Scraping is not supported for {0}")]
    Unsupported(String),

    #[error("Required resource unavailable: {0}")]
    Required(Box<AcquireError>),
}

impl ScrapeError {
    pub fn parse(url: &str, reason: impl Into<String>) -> Self {
        ScrapeError::Parse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ResponseParseError> for ScrapeError {
    fn from(err: ResponseParseError) -> Self {
        match err {
            ResponseParseError::Json { url, source } => ScrapeError::Parse {
                url,
                reason: source.to_string(),
            },
        }
    }
}

impl From<AcquireError> for ScrapeError {
    fn from(err: AcquireError) -> Self {
        ScrapeError::Required(Box::new(err))
    }
}

/// Returns the trimmed value or a [`ScrapeError::MissingField`] when it is
/// absent or blank.
pub fn required<S: AsRef<str>>(field: &'static str, value: Option<S>) -> Result<String, ScrapeError> {
    value
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ScrapeError::MissingField(field))
}

/// The resource a scrape is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteTarget {
    pub id_type: IdType,
    pub id_value: String,
    pub url: String,
}

/// What a site says about the canonical form of a URL it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    Unchanged,
    /// The URL is an alias; resolve this one instead.
    Alias(String),
    /// The URL matched but does not identify a resource by itself.
    Reject,
}

/// Resolves another resource while a scrape is in progress. Implemented by the
/// acquisition orchestrator, which tracks nesting and cycles.
pub trait DependencyResolver: Send + Sync {
    fn require(&self, link: &ResourceLink) -> Result<ExternalResource, AcquireError>;
}

pub struct ScrapeContext<'a> {
    pub fetch: &'a FetchContext,
    pub registry: &'a SiteRegistry,
    pub api_keys: &'a ApiKeys,
    /// Preferred languages for localized fields, most preferred first.
    pub languages: &'a [String],
    pub dependencies: &'a dyn DependencyResolver,
}

/// One external source. Implementations are stateless; everything a call
/// needs arrives through its arguments.
#[async_trait]
pub trait Site: Send + Sync {
    fn site_name(&self) -> SiteName;

    fn id_type(&self) -> IdType;

    /// Anchored patterns whose first capture group is the id value.
    fn url_patterns(&self) -> &[Regex];

    fn default_kind(&self) -> Option<ItemKind>;

    fn id_to_url(&self, id_value: &str) -> String;

    fn url_to_id(&self, url: &str) -> Option<String> {
        self.url_patterns()
            .iter()
            .find_map(|p| p.captures(url))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn matches(&self, url: &str) -> bool {
        self.url_patterns().iter().any(|p| p.is_match(url))
    }

    /// Live probe used when no static pattern of any site matched.
    fn validate_url_fallback(&self, _url: &str, _fetch: &FetchContext) -> bool {
        false
    }

    fn canonicalize(&self, _url: &str, _fetch: &FetchContext) -> Canonical {
        Canonical::Unchanged
    }

    fn scrape(
        &self,
        target: &SiteTarget,
        ctx: &ScrapeContext<'_>,
    ) -> Result<NormalizedDocument, ScrapeError>;

    /// Extra lookups run after a successful scrape, before the document is
    /// stored.
    fn scrape_additional(
        &self,
        _target: &SiteTarget,
        _document: &mut NormalizedDocument,
        _ctx: &ScrapeContext<'_>,
    ) -> Result<(), ScrapeError> {
        Ok(())
    }

    /// Federated search. Never persists anything.
    async fn search(
        &self,
        _query: &SearchQuery,
        _client: &SearchClient,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank_values() {
        assert!(matches!(
            required("title", Some("   ")),
            Err(ScrapeError::MissingField("title"))
        ));
        assert!(matches!(
            required::<&str>("title", None),
            Err(ScrapeError::MissingField("title"))
        ));
        assert_eq!(required("title", Some(" Dune ")).unwrap(), "Dune");
    }

    #[test]
    fn test_missing_field_message_names_the_field() {
        let err = ScrapeError::MissingField("title");
        assert_eq!(err.to_string(), "Missing mandatory field \"title\"");
    }
}
