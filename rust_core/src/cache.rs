//! Tiered caches owned by the fetch orchestrator.
//!
//! Three tiers with different lifetimes:
//! - snapshot cache: cross-process, a JSON file stamped with its fetch time,
//!   30s TTL, so rapid re-runs (and restarts) skip the snapshot call;
//! - manifest cache: in-process, 60s TTL, keyed by canonical game identity,
//!   shared by all market-type consumers;
//! - order-book cache: per run, populated in one prefetch phase and then
//!   read-only; fallback writes are per-key guarded, last writer wins.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::types::{MarketManifest, OrderbookSnapshot};

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotCacheFile {
    fetched_at_unix: u64,
    payload: Value,
}

/// Cross-process consensus snapshot cache backed by a JSON file.
#[derive(Debug, Clone)]
pub struct SnapshotDiskCache {
    path: PathBuf,
    ttl: Duration,
}

impl SnapshotDiskCache {
    pub fn new(path: PathBuf, ttl: Duration) -> Self {
        Self { path, ttl }
    }

    /// A cached payload, if present and within TTL. Any read or parse
    /// problem falls back to a miss.
    pub fn load(&self) -> Option<Value> {
        let content = fs::read_to_string(&self.path).ok()?;
        let file: SnapshotCacheFile = serde_json::from_str(&content).ok()?;
        let now = unix_now();
        if now.saturating_sub(file.fetched_at_unix) > self.ttl.as_secs() {
            debug!("snapshot cache stale ({}s old)", now.saturating_sub(file.fetched_at_unix));
            return None;
        }
        debug!("snapshot cache hit ({})", self.path.display());
        Some(file.payload)
    }

    /// Best-effort store; failures are logged, never fatal.
    pub fn store(&self, payload: &Value) {
        let file = SnapshotCacheFile { fetched_at_unix: unix_now(), payload: payload.clone() };
        match serde_json::to_string(&file) {
            Ok(content) => {
                if let Err(err) = fs::write(&self.path, content) {
                    warn!("failed to write snapshot cache {}: {}", self.path.display(), err);
                }
            }
            Err(err) => warn!("failed to serialize snapshot cache: {}", err),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

struct ManifestEntry {
    fetched_at: Instant,
    manifest: Arc<MarketManifest>,
}

/// In-process market manifest cache keyed by canonical game identity.
pub struct ManifestCache {
    ttl: Duration,
    entries: RwLock<FxHashMap<String, ManifestEntry>>,
}

impl ManifestCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(FxHashMap::default()) }
    }

    pub fn get(&self, canonical_key: &str) -> Option<Arc<MarketManifest>> {
        let entries = self.entries.read();
        let entry = entries.get(canonical_key)?;
        if entry.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(Arc::clone(&entry.manifest))
    }

    pub fn put(&self, canonical_key: String, manifest: Arc<MarketManifest>) {
        self.entries
            .write()
            .insert(canonical_key, ManifestEntry { fetched_at: Instant::now(), manifest });
    }
}

/// Per-run order-book cache. The prefetch phase fills it before any
/// concurrent reads begin; a miss after that point is served by one guarded
/// fallback fetch, and duplicate concurrent writes are tolerated (last
/// writer wins).
#[derive(Default)]
pub struct OrderbookCache {
    books: RwLock<FxHashMap<String, Arc<OrderbookSnapshot>>>,
    failures: RwLock<FxHashMap<String, String>>,
}

impl OrderbookCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str) -> Option<Arc<OrderbookSnapshot>> {
        self.books.read().get(ticker).map(Arc::clone)
    }

    pub fn insert(&self, snapshot: OrderbookSnapshot) -> Arc<OrderbookSnapshot> {
        let arc = Arc::new(snapshot);
        self.books.write().insert(arc.ticker.clone(), Arc::clone(&arc));
        arc
    }

    /// Record a per-ticker fetch failure; the ticker degrades to missing
    /// price data only.
    pub fn record_failure(&self, ticker: &str, reason: String) {
        self.failures.write().insert(ticker.to_string(), reason);
    }

    pub fn failure(&self, ticker: &str) -> Option<String> {
        self.failures.read().get(ticker).cloned()
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("courtedge_test_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_snapshot_cache_round_trip() {
        let path = temp_path("snap");
        let cache = SnapshotDiskCache::new(path.clone(), Duration::from_secs(30));
        let payload = json!({"games": [1, 2, 3]});

        cache.store(&payload);
        assert_eq!(cache.load(), Some(payload));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_snapshot_cache_expires() {
        let path = temp_path("snap_expired");
        let cache = SnapshotDiskCache::new(path.clone(), Duration::from_secs(0));
        cache.store(&json!({"k": "v"}));
        // Zero TTL: anything older than this instant-second boundary is a
        // miss; rewrite the stamp to force staleness deterministically.
        let stale = SnapshotCacheFile { fetched_at_unix: unix_now() - 10, payload: json!({}) };
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();
        assert_eq!(cache.load(), None);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_snapshot_cache_missing_file_is_miss() {
        let cache = SnapshotDiskCache::new(temp_path("snap_missing"), Duration::from_secs(30));
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_manifest_cache_ttl() {
        let cache = ManifestCache::new(Duration::from_secs(60));
        let manifest = Arc::new(MarketManifest {
            event_ticker: "KXNBAGAME-26JAN09LACBKN".to_string(),
            moneyline: None,
            spread_records: vec![],
            total_records: vec![],
        });
        assert!(cache.get("NBA_20260109_BKN_LAC").is_none());
        cache.put("NBA_20260109_BKN_LAC".to_string(), Arc::clone(&manifest));
        let hit = cache.get("NBA_20260109_BKN_LAC").unwrap();
        assert_eq!(hit.event_ticker, manifest.event_ticker);

        let expired = ManifestCache::new(Duration::from_secs(0));
        expired.put("k".to_string(), manifest);
        std::thread::sleep(Duration::from_millis(5));
        assert!(expired.get("k").is_none());
    }

    #[test]
    fn test_orderbook_cache_last_writer_wins() {
        let cache = OrderbookCache::new();
        cache.insert(OrderbookSnapshot { ticker: "T1".to_string(), ..Default::default() });
        let second = OrderbookSnapshot {
            ticker: "T1".to_string(),
            yes_bids: vec![crate::types::PriceLevel { price: 40, size: 1 }],
            no_bids: vec![],
        };
        cache.insert(second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("T1").unwrap().yes_bids.len(), 1);
    }

    #[test]
    fn test_orderbook_failures_recorded_per_ticker() {
        let cache = OrderbookCache::new();
        cache.record_failure("T2", "timeout".to_string());
        assert_eq!(cache.failure("T2"), Some("timeout".to_string()));
        assert_eq!(cache.failure("T3"), None);
        assert!(cache.get("T2").is_none());
    }
}
