use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use catalog_harvest::config::{AppConfig, CliConfig, FileConfig};
use catalog_harvest::fetch::{replay, HttpTransport};
use catalog_harvest::search::{FederatedSearch, SearchCategory, SearchClient};
use catalog_harvest::{
    build_registry, metrics, AcquireOptions, Acquirer, CatalogStore, FetchContext,
    IdentityResolver, SqliteCatalogStore,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(name = "catalog-harvest", about = "Resolve, scrape and merge catalog metadata")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite catalog database file.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db: Option<PathBuf>,

    /// Answer every fetch from fixture files in this directory.
    #[clap(long, global = true, value_parser = parse_path)]
    pub replay_dir: Option<PathBuf>,

    /// Save live response bodies here, named as replay fixtures.
    #[clap(long, global = true, value_parser = parse_path)]
    pub save_dir: Option<PathBuf>,

    #[clap(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[clap(long, global = true)]
    pub retries: Option<u32>,

    #[clap(long, global = true)]
    pub tmdb_api_key: Option<String>,

    #[clap(long, global = true)]
    pub google_books_api_key: Option<String>,

    /// Print the collected metrics before exiting.
    #[clap(long, global = true)]
    pub metrics: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show which site and identifier a URL resolves to.
    Resolve { url: String },

    /// Acquire the resource behind a URL and print the resulting item.
    Fetch {
        url: String,
        /// Scrape again even if the resource is already stored.
        #[clap(long)]
        force: bool,
        /// Scrape and print the document without saving anything.
        #[clap(long)]
        dry_run: bool,
    },

    /// Search every participating site.
    Search {
        query: String,
        #[clap(long, default_value = "all")]
        category: String,
        #[clap(long, default_value_t = 1)]
        page: u32,
    },

    /// Merge one item into another.
    Merge { source: String, target: String },

    /// Print an item with its resources and relations.
    Show { item_id: String },

    /// Delete an item that has no merge history and no relations.
    Delete { item_id: String },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db.clone(),
            replay_dir: self.replay_dir.clone(),
            save_dir: self.save_dir.clone(),
            timeout_secs: self.timeout_secs,
            retries: self.retries,
            tmdb_api_key: self.tmdb_api_key.clone(),
            google_books_api_key: self.google_books_api_key.clone(),
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let mut cli_config = cli_args.to_cli_config();
    if cli_config.db_path.is_none() {
        cli_config.db_path = Some(parse_path("catalog.db")?);
    }
    let config = AppConfig::resolve(&cli_config, file_config)?;

    metrics::init_metrics();
    if let Some(dir) = &config.replay_dir {
        info!("Replay mode, fixtures from {:?}", dir);
        replay::enable(dir);
    }

    let registry = Arc::new(build_registry(&config.resolver)?);
    let fetch = FetchContext::new(Arc::new(HttpTransport::new()?), config.fetch.clone());

    match cli_args.command {
        Command::Resolve { url } => {
            let resolved = registry.resolve(&url, &fetch)?;
            let kind = resolved
                .site
                .default_kind()
                .map_or_else(|| "-".to_string(), |k| k.to_string());
            println!(
                "{}\t{}\t{}\t{}\t{}",
                resolved.site.site_name().as_str(),
                resolved.target.id_type,
                resolved.target.id_value,
                kind,
                resolved.target.url
            );
        }
        Command::Fetch {
            url,
            force,
            dry_run,
        } => {
            let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(&config.db_path)?);
            let acquirer = Acquirer::new(registry.clone(), fetch, store, config.resolver.clone())
                .with_api_keys(config.api_keys.clone())
                .with_languages(config.languages.clone());
            let options = match (dry_run, force) {
                (true, _) => AcquireOptions::dry_run(),
                (false, true) => AcquireOptions::forced(),
                (false, false) => AcquireOptions::default(),
            };
            let acquired = acquirer.get_resource_ready(&url, options)?;
            match &acquired.item {
                Some(item) => print_json(item)?,
                None => print_json(&acquired.resource)?,
            }
        }
        Command::Search {
            query,
            category,
            page,
        } => {
            let Some(category) = SearchCategory::parse(&category) else {
                bail!("Unknown search category {:?}", category);
            };
            let runtime = tokio::runtime::Runtime::new()?;
            let results = runtime.block_on(async {
                let client = SearchClient::new(
                    Duration::from_millis(config.search.timeout_ms),
                    &config.fetch.user_agent,
                    config.api_keys.clone(),
                    config.languages.clone(),
                )?;
                let search = FederatedSearch::new(registry.clone(), client, config.search.clone());
                anyhow::Ok(search.search(&query, category, page).await)
            })?;
            print_json(&results)?;
        }
        Command::Merge { source, target } => {
            let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(&config.db_path)?);
            let identity = IdentityResolver::new(store, config.resolver.merge_hop_limit);
            let merged = identity.merge_to(&source, &target)?;
            print_json(&merged)?;
        }
        Command::Show { item_id } => {
            let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(&config.db_path)?);
            let identity = IdentityResolver::new(store.clone(), config.resolver.merge_hop_limit);
            let item = identity.resolve(&item_id)?;
            print_json(&serde_json::json!({
                "item": item,
                "merged_from": store.merged_from(&item.id)?,
                "children": store.children_of(&item.id)?,
                "resources": store.resources_of_item(&item.id)?,
                "relations": store.relations_of(&item.id)?,
            }))?;
        }
        Command::Delete { item_id } => {
            let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(&config.db_path)?);
            let identity = IdentityResolver::new(store, config.resolver.merge_hop_limit);
            identity.delete(&item_id)?;
            println!("Deleted {}", item_id);
        }
    }

    if cli_args.metrics {
        print!("{}", metrics::gather_text());
    }
    Ok(())
}
