//! Scan configuration: league identity, exchange series, timezones, cache
//! TTLs and fetch limits.
//!
//! Everything here is a plain value object with production defaults for the
//! NBA. Endpoint URLs and API keys are read from environment variables by
//! the feed clients, not here.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

use crate::pricing::FeeSchedule;

/// Configuration for one scanner instance.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// League code used in canonical keys (e.g. "NBA").
    pub league_code: String,
    /// Consensus provider league id (NBA is 3).
    pub league_id: u32,
    /// Consensus provider period tag for full-game lines.
    pub period_tag: String,
    /// Consensus provider market-source id for the consensus book.
    pub market_source_id: String,

    /// Exchange series ticker for winner markets.
    pub game_series: String,
    /// Exchange series ticker for points-margin markets.
    pub spread_series: String,
    /// Exchange series ticker for combined-points markets.
    pub total_series: String,

    /// Timezone defining "today's slate" (provider lists games by this date).
    pub slate_timezone: Tz,
    /// Timezone the exchange uses for dates embedded in tickers. Evening
    /// games cross the UTC midnight boundary, so UTC dates mismatch.
    pub ticker_timezone: Tz,

    /// TTL of the cross-process consensus snapshot cache.
    pub snapshot_ttl: Duration,
    /// Path of the snapshot cache file.
    pub snapshot_cache_path: PathBuf,
    /// TTL of the per-game market manifest cache.
    pub manifest_ttl: Duration,

    /// Fixed timeout applied to every exchange call.
    pub fetch_timeout: Duration,
    /// Fixed timeout applied to the consensus snapshot call.
    pub snapshot_timeout: Duration,
    /// Max in-flight order-book fetches during the prefetch batch.
    pub prefetch_concurrency: usize,

    /// Nearest strikes selected per game per strike market.
    pub strikes_per_market: usize,

    /// Exchange fee schedule used for break-evens and EV.
    pub fees: FeeSchedule,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            league_code: "NBA".to_string(),
            league_id: 3,
            period_tag: "pt1".to_string(),
            market_source_id: "ms49".to_string(),
            game_series: "KXNBAGAME".to_string(),
            spread_series: "KXNBASPREAD".to_string(),
            total_series: "KXNBATOTAL".to_string(),
            slate_timezone: chrono_tz::America::Los_Angeles,
            ticker_timezone: chrono_tz::America::New_York,
            snapshot_ttl: Duration::from_secs(30),
            snapshot_cache_path: default_cache_path(),
            manifest_ttl: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            snapshot_timeout: Duration::from_secs(20),
            prefetch_concurrency: 8,
            strikes_per_market: 2,
            fees: FeeSchedule::default(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    match env::var("COURTEDGE_SNAPSHOT_CACHE") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => env::temp_dir().join("courtedge_snapshot_cache.json"),
    }
}

impl ScanConfig {
    /// Prefix of the provider's per-league event collection keys.
    pub fn league_key_prefix(&self) -> String {
        format!("lg{}:", self.league_id)
    }

    /// Marker of the provider's consensus market-source line keys.
    pub fn source_key_marker(&self) -> String {
        format!(":{}:", self.market_source_id)
    }
}
