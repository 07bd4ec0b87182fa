//! Exchange API client, read-only market data.
//!
//! Order execution and authenticated endpoints are deliberately absent;
//! this scanner only lists events and markets and reads order books.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::env;
use std::time::Duration;

use crate::clients::ExchangeFeed;
use crate::types::{OrderbookSnapshot, PriceLevel};

const KALSHI_API_PROD: &str = "https://api.elections.kalshi.com/trade-api/v2";
const PAGE_LIMIT: &str = "200";

/// Read-only exchange client with a fixed per-call timeout.
#[derive(Debug, Clone)]
pub struct KalshiClient {
    client: Client,
    base_url: String,
}

impl KalshiClient {
    /// Base URL comes from `KALSHI_BASE_URL` when set, production otherwise.
    pub fn new(timeout: Duration) -> Result<Self> {
        let base_url = env::var("KALSHI_BASE_URL").unwrap_or_else(|_| KALSHI_API_PROD.to_string());

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for exchange")?;

        Ok(Self { client, base_url })
    }

    async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("exchange API error ({}) on {}: {}", status, path, body);
        }

        resp.json().await.with_context(|| format!("invalid JSON from {}", path))
    }
}

#[async_trait]
impl ExchangeFeed for KalshiClient {
    async fn fetch_events(&self, series_ticker: &str) -> Result<Vec<Value>> {
        let mut all_events = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("series_ticker", series_ticker),
                ("status", "open"),
                ("limit", PAGE_LIMIT),
            ];
            if let Some(c) = cursor.as_deref() {
                params.push(("cursor", c));
            }

            let resp = self.get_json("/events", &params).await?;
            if let Some(events) = resp.get("events").and_then(Value::as_array) {
                all_events.extend(events.iter().cloned());
            }

            cursor = ["cursor", "next_cursor"]
                .iter()
                .filter_map(|k| resp.get(*k))
                .find_map(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        debug!("fetched {} event(s) for series {}", all_events.len(), series_ticker);
        Ok(all_events)
    }

    async fn fetch_markets(&self, event_ticker: &str) -> Result<Vec<Value>> {
        let resp = self
            .get_json("/markets", &[("event_ticker", event_ticker), ("status", "open")])
            .await?;
        let markets = resp
            .get("markets")
            .and_then(Value::as_array)
            .map(|a| a.to_vec())
            .unwrap_or_default();
        debug!("fetched {} market(s) for event {}", markets.len(), event_ticker);
        Ok(markets)
    }

    async fn fetch_orderbook(&self, ticker: &str) -> Result<OrderbookSnapshot> {
        let path = format!("/markets/{}/orderbook", ticker.trim().to_uppercase());
        let resp = self.get_json(&path, &[]).await?;
        Ok(parse_orderbook(ticker, &resp))
    }

    fn feed_name(&self) -> &str {
        "kalshi"
    }
}

/// Parse the wire order book: `{"orderbook": {"yes": [[price, qty], ...],
/// "no": [[price, qty], ...]}}`. Both arrays are resting bids. Levels
/// outside 1-99 cents are discarded.
pub fn parse_orderbook(ticker: &str, payload: &Value) -> OrderbookSnapshot {
    let book = payload.get("orderbook").unwrap_or(payload);
    OrderbookSnapshot {
        ticker: ticker.trim().to_uppercase(),
        yes_bids: parse_levels(ticker, book.get("yes")),
        no_bids: parse_levels(ticker, book.get("no")),
    }
}

fn parse_levels(ticker: &str, side: Option<&Value>) -> Vec<PriceLevel> {
    let entries = match side.and_then(Value::as_array) {
        Some(entries) => entries,
        None => return Vec::new(),
    };

    let mut levels = Vec::with_capacity(entries.len());
    for entry in entries {
        let pair = match entry.as_array() {
            Some(pair) if pair.len() >= 2 => pair,
            _ => continue,
        };
        let (Some(price), Some(size)) = (pair[0].as_i64(), pair[1].as_i64()) else {
            continue;
        };
        if !(1..=99).contains(&price) || size < 0 {
            warn!("discarding out-of-range level ({}, {}) on {}", price, size, ticker);
            continue;
        }
        levels.push(PriceLevel { price: price as u8, size: size as u32 });
    }
    levels
}
