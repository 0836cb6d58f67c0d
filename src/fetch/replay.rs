//! Replay mode: fetches are answered from fixture files instead of the
//! network. The switch is process wide so every fetcher honors it, no matter
//! how it was composed.

use super::transport::{FetchRequest, RawResponse, Transport, TransportError};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_FIXTURE_NAME_LEN: usize = 255;
const MISSING_FIXTURE_BODY: &[u8] = b"Error: response file not found";

lazy_static! {
    static ref REPLAY_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);
    static ref NON_WORD: Regex = Regex::new(r"[^\w]").unwrap();
    static ref API_KEY: Regex = Regex::new(r"_key_[*A-Za-z0-9]+").unwrap();
}

/// Turns replay mode on, serving fixtures from `dir`.
pub fn enable(dir: impl Into<PathBuf>) {
    let dir = dir.into();
    debug!(dir = %dir.display(), "Replay mode enabled");
    *REPLAY_DIR.write().unwrap() = Some(dir);
}

pub fn fixture_dir() -> Option<PathBuf> {
    REPLAY_DIR.read().unwrap().clone()
}

pub fn is_enabled() -> bool {
    REPLAY_DIR.read().unwrap().is_some()
}

/// File name a URL is stored under. API keys embedded in the query string are
/// masked so fixtures can be recorded with a real key and replayed without one.
pub fn fixture_name(url: &str) -> String {
    let sanitized = NON_WORD.replace_all(url, "_");
    let masked = API_KEY.replace_all(&sanitized, "_key_8964");
    masked.chars().take(MAX_FIXTURE_NAME_LEN).collect()
}

fn guess_content_type(url: &str) -> &'static str {
    if url.ends_with("jpg") {
        "image/jpeg"
    } else {
        "text/html"
    }
}

/// Writes a live response body under its fixture name.
pub fn save_capture(dir: &Path, url: &str, body: &[u8]) {
    let path = dir.join(fixture_name(url));
    if let Err(err) = std::fs::write(&path, body) {
        warn!(url, path = %path.display(), "Failed to save response capture: {}", err);
    }
}

/// Serves responses from files named by [`fixture_name`].
pub struct ReplayTransport {
    dir: PathBuf,
}

impl ReplayTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn read(&self, url: &str) -> RawResponse {
        let path = self.dir.join(fixture_name(url));
        match std::fs::read(&path) {
            Ok(body) => {
                debug!(url, fixture = %path.display(), "Serving replay fixture");
                RawResponse::new(url, 200, Some(guess_content_type(url)), body)
            }
            Err(_) => {
                warn!(url, fixture = %path.display(), "Replay fixture not found");
                RawResponse::new(url, 404, Some("text/html"), MISSING_FIXTURE_BODY.to_vec())
            }
        }
    }
}

impl Transport for ReplayTransport {
    fn get(&self, request: &FetchRequest<'_>) -> Result<RawResponse, TransportError> {
        Ok(self.read(request.url))
    }

    fn resolve_redirects(&self, url: &str, _timeout: Duration) -> Result<String, TransportError> {
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::transport::Headers;
    use tempfile::TempDir;

    #[test]
    fn test_fixture_name_replaces_non_word_characters() {
        assert_eq!(
            fixture_name("https://bgm.tv/subject/228"),
            "https___bgm_tv_subject_228"
        );
    }

    #[test]
    fn test_fixture_name_masks_api_keys() {
        let a = fixture_name("https://api.themoviedb.org/3/movie/1?api_key=abc123&language=en");
        let b = fixture_name("https://api.themoviedb.org/3/movie/1?api_key=zzz999&language=en");
        assert_eq!(a, b);
        assert!(a.contains("_key_8964_language"));
    }

    #[test]
    fn test_fixture_name_is_truncated() {
        let url = format!("https://example.org/{}", "a".repeat(400));
        assert_eq!(fixture_name(&url).chars().count(), 255);
    }

    #[test]
    fn test_replay_transport_serves_fixture() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.org/cover.jpg";
        std::fs::write(dir.path().join(fixture_name(url)), b"bytes").unwrap();

        let transport = ReplayTransport::new(dir.path());
        let headers = Headers::new();
        let response = transport
            .get(&FetchRequest {
                url,
                headers: &headers,
                timeout: Duration::from_secs(1),
            })
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"bytes");
        assert_eq!(response.content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_missing_fixture_is_404() {
        let dir = TempDir::new().unwrap();
        let transport = ReplayTransport::new(dir.path());
        let response = transport.read("https://example.org/page");
        assert_eq!(response.status, 404);
        assert_eq!(response.body, MISSING_FIXTURE_BODY);
    }

    #[test]
    fn test_save_capture_round_trips_through_replay() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.org/item?id=1";
        save_capture(dir.path(), url, b"{\"ok\":true}");
        let response = ReplayTransport::new(dir.path()).read(url);
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"{\"ok\":true}");
    }
}
