//! Resilient downloads.
//!
//! [`BasicFetcher`] performs a single classified request; the decorators in
//! this module add one resilience behavior each and compose by wrapping:
//!
//! ```ignore
//! let fetcher = RetryFetcher::new(ctx.basic(), RetryPolicy::default());
//! let page = fetcher.download(url)?.as_html();
//! ```

mod basic;
mod cached;
mod censorship;
mod context;
mod error;
mod image_validator;
mod models;
mod proxied;
pub mod replay;
mod response;
mod retry;
pub mod testing;
mod transport;

pub use basic::{BasicFetcher, Fetch, Fetched};
pub use cached::{cache_key, CachedFetcher, MemoryCache, ResponseCache};
pub use censorship::CensorshipFilter;
pub use context::FetchContext;
pub use error::{DownloadError, ResponseParseError};
pub use image_validator::{download_image, extension_for_mime, image_extension, ImageValidator};
pub use models::{FetchAttempt, FetchLog, ResponseOutcome};
pub use proxied::{apply_template, ProxiedFetcher, URL_PLACEHOLDER};
pub use response::FetchedResponse;
pub use retry::{RetryFetcher, RetryPolicy};
pub use transport::{FetchRequest, Headers, HttpTransport, RawResponse, Transport, TransportError};
