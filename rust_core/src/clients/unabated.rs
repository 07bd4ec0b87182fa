//! Consensus provider client.
//!
//! One endpoint: the full game-odds snapshot, authenticated with an API key
//! query parameter. Credential loading beyond the environment variable is a
//! collaborator concern.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::time::Duration;

use crate::clients::ConsensusFeed;

const UNABATED_PROD_URL: &str = "https://partner-api.unabated.com/api/markets/gameOdds";

/// Snapshot client with a fixed per-call timeout.
#[derive(Debug, Clone)]
pub struct UnabatedClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl UnabatedClient {
    /// Reads `UNABATED_API_KEY` (required) and `UNABATED_BASE_URL`
    /// (optional override) from the environment.
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let api_key = env::var("UNABATED_API_KEY").context("UNABATED_API_KEY is not set")?;
        if api_key.is_empty() {
            anyhow::bail!("UNABATED_API_KEY is empty");
        }

        let base_url =
            env::var("UNABATED_BASE_URL").unwrap_or_else(|_| UNABATED_PROD_URL.to_string());

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for consensus feed")?;

        debug!("consensus client initialized ({})", base_url);
        Ok(Self { client, base_url, api_key })
    }
}

#[async_trait]
impl ConsensusFeed for UnabatedClient {
    async fn fetch_snapshot(&self) -> Result<Value> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("x-api-key", self.api_key.as_str())])
            .send()
            .await
            .context("consensus snapshot request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!("consensus snapshot returned {}", status);
            anyhow::bail!("consensus API error: {}", status);
        }

        resp.json().await.context("consensus snapshot was not valid JSON")
    }

    fn feed_name(&self) -> &str {
        "unabated"
    }
}
