mod file_config;

pub use file_config::{ApiKeysConfig, FetchConfig, FileConfig, ResolverConfig, SearchConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub replay_dir: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub tmdb_api_key: Option<String>,
    pub google_books_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// When set, every fetch is answered from fixture files in this directory.
    pub replay_dir: Option<PathBuf>,
    /// Languages scrapers request localized fields in, most preferred first.
    pub languages: Vec<String>,

    pub fetch: FetchSettings,
    pub resolver: ResolverSettings,
    pub search: SearchSettings,
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub proxies: Vec<String>,
    pub backup_proxy: Option<String>,
    pub cache_ttl_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
    pub save_dir: Option<PathBuf>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 8,
            probe_timeout_secs: 2,
            retries: 3,
            retry_backoff_ms: 500,
            proxies: Vec::new(),
            backup_proxy: None,
            cache_ttl_secs: 300,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
            save_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Maximum `merged_to` hops walked before giving up.
    pub merge_hop_limit: usize,
    /// Maximum nesting of required resources.
    pub max_required_depth: usize,
    /// Maximum canonical-URL re-resolutions for one input URL.
    pub canonical_redirect_limit: usize,
    pub crawl_related: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            merge_hop_limit: 5,
            max_required_depth: 5,
            canonical_redirect_limit: 3,
            crawl_related: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteFilter {
    All,
    Nothing,
    Only(Vec<String>),
}

impl SiteFilter {
    pub fn from_names(names: &[String]) -> Self {
        match names {
            [] => SiteFilter::All,
            [one] if one == "*" => SiteFilter::All,
            [one] if one == "-" => SiteFilter::Nothing,
            _ => SiteFilter::Only(names.iter().map(|n| n.to_ascii_lowercase()).collect()),
        }
    }

    pub fn allows(&self, site_name: &str) -> bool {
        match self {
            SiteFilter::All => true,
            SiteFilter::Nothing => false,
            SiteFilter::Only(names) => names.iter().any(|n| n == &site_name.to_ascii_lowercase()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub timeout_ms: u64,
    pub sites: SiteFilter,
    pub cache_ttl_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            sites: SiteFilter::All,
            cache_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub tmdb: Option<String>,
    pub google_books: Option<String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db or in config file")
            })?;
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let replay_dir = file
            .replay_dir
            .map(PathBuf::from)
            .or_else(|| cli.replay_dir.clone());
        if let Some(dir) = &replay_dir {
            if !dir.is_dir() {
                bail!("Replay directory does not exist: {:?}", dir);
            }
        }

        let languages = file
            .languages
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| vec!["en".to_string()]);

        let defaults = FetchSettings::default();
        let fetch_file = file.fetch.unwrap_or_default();
        let fetch = FetchSettings {
            timeout_secs: fetch_file
                .timeout_secs
                .or(cli.timeout_secs)
                .unwrap_or(defaults.timeout_secs),
            probe_timeout_secs: fetch_file
                .probe_timeout_secs
                .unwrap_or(defaults.probe_timeout_secs),
            retries: fetch_file.retries.or(cli.retries).unwrap_or(defaults.retries),
            retry_backoff_ms: fetch_file
                .retry_backoff_ms
                .unwrap_or(defaults.retry_backoff_ms),
            proxies: fetch_file.proxies.unwrap_or_default(),
            backup_proxy: fetch_file.backup_proxy,
            cache_ttl_secs: fetch_file.cache_ttl_secs.unwrap_or(defaults.cache_ttl_secs),
            user_agent: fetch_file.user_agent.unwrap_or(defaults.user_agent),
            accept_language: fetch_file
                .accept_language
                .unwrap_or(defaults.accept_language),
            save_dir: fetch_file
                .save_dir
                .map(PathBuf::from)
                .or_else(|| cli.save_dir.clone()),
        };
        for template in fetch.proxies.iter().chain(fetch.backup_proxy.iter()) {
            if !template.contains(crate::fetch::URL_PLACEHOLDER) {
                bail!(
                    "Proxy template {:?} must contain {}",
                    template,
                    crate::fetch::URL_PLACEHOLDER
                );
            }
        }

        let resolver_defaults = ResolverSettings::default();
        let resolver_file = file.resolver.unwrap_or_default();
        let resolver = ResolverSettings {
            merge_hop_limit: resolver_file
                .merge_hop_limit
                .unwrap_or(resolver_defaults.merge_hop_limit),
            max_required_depth: resolver_file
                .max_required_depth
                .unwrap_or(resolver_defaults.max_required_depth),
            canonical_redirect_limit: resolver_file
                .canonical_redirect_limit
                .unwrap_or(resolver_defaults.canonical_redirect_limit),
            crawl_related: resolver_file
                .crawl_related
                .unwrap_or(resolver_defaults.crawl_related),
        };
        if resolver.merge_hop_limit == 0 {
            bail!("resolver.merge_hop_limit must be at least 1");
        }

        let search_defaults = SearchSettings::default();
        let search_file = file.search.unwrap_or_default();
        let search = SearchSettings {
            timeout_ms: search_file.timeout_ms.unwrap_or(search_defaults.timeout_ms),
            sites: search_file
                .sites
                .map(|names| SiteFilter::from_names(&names))
                .unwrap_or(search_defaults.sites),
            cache_ttl_secs: search_file
                .cache_ttl_secs
                .unwrap_or(search_defaults.cache_ttl_secs),
        };

        let keys_file = file.api_keys.unwrap_or_default();
        let api_keys = ApiKeys {
            tmdb: keys_file.tmdb.or_else(|| cli.tmdb_api_key.clone()),
            google_books: keys_file
                .google_books
                .or_else(|| cli.google_books_api_key.clone()),
        };

        Ok(Self {
            db_path,
            replay_dir,
            languages,
            fetch,
            resolver,
            search,
            api_keys,
        })
    }
}
