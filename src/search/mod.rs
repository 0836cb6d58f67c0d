//! Federated search: a read-only side channel that asks every participating
//! site for matches and aggregates whatever answers in time.

mod client;
mod federated;
mod models;

pub use client::SearchClient;
pub use federated::FederatedSearch;
pub use models::{
    window, SearchCategory, SearchQuery, SearchResultItem, MAX_PAGE, MAX_QUERY_CHARS,
};
