//! Common test infrastructure
//!
//! Integration tests build an [`Harness`] around in-memory storage, a
//! scripted transport and a registry of [`StubSite`]s whose pages are set up
//! per test. Tests should only import from this module.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{movie_doc, Harness, MOVIE_HOST};
//! use catalog_harvest::AcquireOptions;
//!
//! #[test]
//! fn test_acquire_movie() {
//!     let harness = Harness::new();
//!     harness.movies.add_page("m1", movie_doc("Alien", &[]));
//!
//!     let acquired = harness
//!         .acquirer
//!         .get_resource_ready(&harness.movies.url_for("m1"), AcquireOptions::default())
//!         .unwrap();
//!     assert!(acquired.item.is_some());
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod documents;
mod harness;
mod stub_site;

pub use constants::*;
pub use documents::{movie_doc, season_doc, show_doc, tiny_png};
pub use harness::Harness;
pub use stub_site::{StubSearch, StubSite};
