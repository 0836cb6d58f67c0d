use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub replay_dir: Option<String>,
    pub languages: Option<Vec<String>>,

    // Feature configs
    pub fetch: Option<FetchConfig>,
    pub resolver: Option<ResolverConfig>,
    pub search: Option<SearchConfig>,
    pub api_keys: Option<ApiKeysConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    /// Proxy URL templates; `__URL__` is replaced by the encoded target.
    pub proxies: Option<Vec<String>>,
    pub backup_proxy: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub save_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    pub merge_hop_limit: Option<usize>,
    pub max_required_depth: Option<usize>,
    pub canonical_redirect_limit: Option<usize>,
    pub crawl_related: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub timeout_ms: Option<u64>,
    /// Site names taking part in federated search, `["*"]` for all,
    /// `["-"]` for none.
    pub sites: Option<Vec<String>>,
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ApiKeysConfig {
    pub tmdb: Option<String>,
    pub google_books: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
