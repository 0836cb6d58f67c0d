//! Catalog Harvest Library
//!
//! Resilient acquisition of creative-work metadata from external sites:
//! layered fetching, URL-to-site resolution, scraping into normalized
//! documents, and identity matching and merging of canonical items.

pub mod acquisition;
pub mod catalog_store;
pub mod config;
pub mod document;
pub mod fetch;
pub mod identity;
pub mod metrics;
pub mod search;
pub mod sites;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use acquisition::{AcquireError, AcquireOptions, Acquired, Acquirer};
pub use catalog_store::{CatalogStore, SqliteCatalogStore};
pub use document::{ItemKind, NormalizedDocument};
pub use fetch::{FetchContext, ResponseOutcome};
pub use identity::{IdentityError, IdentityResolver};
pub use sites::{build_registry, IdType, SiteRegistry};
