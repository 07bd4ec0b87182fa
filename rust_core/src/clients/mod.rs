//! Feed client seams.
//!
//! The orchestrator talks to the outside world only through these traits,
//! so tests swap in canned implementations and no other component ever
//! holds a network handle.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::OrderbookSnapshot;

pub mod kalshi;
pub mod unabated;

pub use kalshi::KalshiClient;
pub use unabated::UnabatedClient;

/// Source of the sportsbook consensus snapshot.
#[async_trait]
pub trait ConsensusFeed: Send + Sync {
    /// Fetch the full snapshot payload. The schema is only partially owned,
    /// so it stays a raw `Value`.
    async fn fetch_snapshot(&self) -> Result<Value>;

    /// Feed name for logging.
    fn feed_name(&self) -> &str;
}

/// Read-only market-data surface of the exchange.
#[async_trait]
pub trait ExchangeFeed: Send + Sync {
    /// All open events of a series, all pages combined.
    async fn fetch_events(&self, series_ticker: &str) -> Result<Vec<Value>>;

    /// All open markets of one event.
    async fn fetch_markets(&self, event_ticker: &str) -> Result<Vec<Value>>;

    /// The bid-only order book of one market.
    async fn fetch_orderbook(&self, ticker: &str) -> Result<OrderbookSnapshot>;

    /// Feed name for logging.
    fn feed_name(&self) -> &str;
}
