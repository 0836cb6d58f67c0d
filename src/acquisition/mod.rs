//! Turns URLs and identifiers into persisted external resources and the
//! canonical items they belong to.

mod lock;
mod orchestrator;

pub use lock::{IdentifierGuard, IdentifierLocks, WaitCycle};
pub use orchestrator::Acquirer;

use crate::catalog_store::{ExternalResource, Item};
use crate::document::NormalizedDocument;
use crate::identity::IdentityError;
use crate::sites::{IdType, ResolveError, ScrapeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Unresolvable URL {0}")]
    Unresolvable(String),

    #[error("No site registered for id type {0}")]
    UnknownIdType(String),

    #[error("Required resource cycle at {id_type}:{id_value} ({})", .trail.join(" -> "))]
    Cycle {
        id_type: IdType,
        id_value: String,
        trail: Vec<String>,
    },

    #[error("Required resources nested deeper than {limit} at {id_type}:{id_value}")]
    DepthExceeded {
        id_type: IdType,
        id_value: String,
        limit: usize,
    },

    #[error(transparent)]
    Scrape(ScrapeError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// A required resource that failed surfaces as its own error, not as a
/// failure of the scrape that asked for it.
impl From<ScrapeError> for AcquireError {
    fn from(err: ScrapeError) -> Self {
        match err {
            ScrapeError::Required(inner) => *inner,
            other => AcquireError::Scrape(other),
        }
    }
}

impl From<ResolveError> for AcquireError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Unresolvable(url) => AcquireError::Unresolvable(url),
            ResolveError::UnknownIdType(id_type) => AcquireError::UnknownIdType(id_type),
            other => AcquireError::Store(anyhow::anyhow!(other)),
        }
    }
}

/// Flags of one acquisition. Use [`normalized`](Self::normalized) before
/// acting on them: linking turns on creating, creating turns on saving.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub auto_save: bool,
    pub auto_create: bool,
    pub auto_link: bool,
    /// Scrape again even when a ready resource is stored.
    pub ignore_existing: bool,
    /// Content the caller already has, used instead of scraping.
    pub preloaded: Option<NormalizedDocument>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            auto_save: true,
            auto_create: true,
            auto_link: true,
            ignore_existing: false,
            preloaded: None,
        }
    }
}

impl AcquireOptions {
    /// Scrape without touching storage.
    pub fn dry_run() -> Self {
        Self {
            auto_save: false,
            auto_create: false,
            auto_link: false,
            ..Default::default()
        }
    }

    pub fn forced() -> Self {
        Self {
            ignore_existing: true,
            ..Default::default()
        }
    }

    pub fn with_preloaded(mut self, document: NormalizedDocument) -> Self {
        self.preloaded = Some(document);
        self
    }

    pub fn normalized(mut self) -> Self {
        if self.auto_link {
            self.auto_create = true;
        }
        if self.auto_create {
            self.auto_save = true;
        }
        self
    }

    /// The flags for a dependency or related resource: same persistence,
    /// existing content reused, nothing preloaded.
    pub fn for_dependency(&self) -> Self {
        Self {
            auto_save: self.auto_save,
            auto_create: self.auto_create,
            auto_link: self.auto_link,
            ignore_existing: false,
            preloaded: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Acquired {
    pub resource: ExternalResource,
    /// The live item the resource belongs to, when creation was requested.
    pub item: Option<Item>,
    /// True when stored content was used instead of scraping.
    pub reused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_normalization() {
        let options = AcquireOptions {
            auto_save: false,
            ..Default::default()
        }
        .normalized();
        assert!(options.auto_save);
        assert!(options.auto_create);
        assert!(options.auto_link);

        let options = AcquireOptions {
            auto_save: false,
            auto_create: false,
            auto_link: true,
            ..Default::default()
        }
        .normalized();
        assert!(options.auto_create);
        assert!(options.auto_save);

        let options = AcquireOptions {
            auto_link: false,
            ..Default::default()
        }
        .normalized();
        assert!(options.auto_save);
        assert!(options.auto_create);
        assert!(!options.auto_link);

        let options = AcquireOptions::dry_run().normalized();
        assert!(!options.auto_save);
        assert!(!options.auto_create);
        assert!(!options.auto_link);
    }

    #[test]
    fn test_required_failure_is_unwrapped() {
        let inner = AcquireError::Unresolvable("https://example.org/x".into());
        let err = AcquireError::from(ScrapeError::from(inner));
        assert!(matches!(err, AcquireError::Unresolvable(_)));
    }

    #[test]
    fn test_unknown_id_type_is_not_reported_as_a_url() {
        let err = AcquireError::from(ResolveError::UnknownIdType("imdb".into()));
        assert!(matches!(err, AcquireError::UnknownIdType(_)));
        assert_eq!(err.to_string(), "No site registered for id type imdb");
    }

    #[test]
    fn test_cycle_message_lists_trail() {
        let err = AcquireError::Cycle {
            id_type: IdType::TmdbTv,
            id_value: "1".into(),
            trail: vec!["tmdb_tv:1".into(), "tmdb_tvseason:1-1".into()],
        };
        assert_eq!(
            err.to_string(),
            "Required resource cycle at tmdb_tv:1 (tmdb_tv:1 -> tmdb_tvseason:1-1)"
        );
    }
}
