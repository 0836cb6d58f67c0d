//! Cache decorator over a shared key-value store with time-to-live.

use super::basic::{Fetch, Fetched};
use super::models::{FetchLog, ResponseOutcome};
use super::response::FetchedResponse;
use super::transport::RawResponse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Shared store for successful responses. Implementations must be safe for
/// concurrent use.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<RawResponse>;
    fn put(&self, key: &str, value: RawResponse, ttl: Duration);
}

/// In-process TTL map. Expired entries are dropped on lookup and swept on
/// every store.
pub struct MemoryCache<V> {
    entries: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((expires_at, value)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn store(&self, key: &str, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, (expires_at, _)| *expires_at > now);
        entries.insert(key.to_string(), (now + ttl, value));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache for MemoryCache<RawResponse> {
    fn get(&self, key: &str) -> Option<RawResponse> {
        self.lookup(key)
    }

    fn put(&self, key: &str, value: RawResponse, ttl: Duration) {
        self.store(key, value, ttl)
    }
}

pub fn cache_key(url: &str) -> String {
    format!("dl:{url}")
}

pub struct CachedFetcher<F> {
    inner: F,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
}

impl<F: Fetch> CachedFetcher<F> {
    pub fn new(inner: F, cache: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

impl<F: Fetch> Fetch for CachedFetcher<F> {
    fn fetch(&self, url: &str, log: &mut FetchLog) -> Fetched {
        let key = cache_key(url);
        if let Some(raw) = self.cache.get(&key) {
            debug!(url, "Cache hit");
            return Fetched::new(Some(FetchedResponse::new(raw)), ResponseOutcome::Ok);
        }
        let fetched = self.inner.fetch(url, log);
        if let (ResponseOutcome::Ok, Some(response)) = (fetched.outcome, &fetched.response) {
            self.cache.put(&key, response.raw().clone(), self.ttl);
        }
        fetched
    }
}
