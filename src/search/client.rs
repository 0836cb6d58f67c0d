//! Non-blocking HTTP client for the federated search side channel.

use crate::config::ApiKeys;
use crate::fetch::replay;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Shared by every site during one federated search. Honors replay mode by
/// reading fixtures instead of calling out.
#[derive(Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    api_keys: ApiKeys,
    languages: Vec<String>,
    user_agent: String,
}

impl SearchClient {
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        api_keys: ApiKeys,
        languages: Vec<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create search HTTP client")?;
        Ok(Self {
            client,
            api_keys,
            languages,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn api_keys(&self) -> &ApiKeys {
        &self.api_keys
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        if let Some(dir) = replay::fixture_dir() {
            let path = dir.join(replay::fixture_name(url));
            debug!(url, fixture = %path.display(), "Serving search from replay fixture");
            let body = tokio::fs::read(&path)
                .await
                .with_context(|| format!("No replay fixture for {}", url))?;
            return serde_json::from_slice(&body)
                .with_context(|| format!("Failed to parse search response from {}", url));
        }

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("Search request {} failed with status: {}", url, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse search response from {}", url))
    }
}
