//! Staged fetch orchestration.
//!
//! Every network call in a scan is owned here. Each phase is a distinct
//! type that consumes its predecessor, so out-of-order access is
//! unrepresentable:
//!
//! `FetchOrchestrator` -> `SnapshotLoaded` -> `GamesResolved` ->
//! `MarketsResolved` -> `ScanContext` (ready; dropped when discarded)
//!
//! Snapshot and manifest fetch failures abort their phase and surface to
//! the caller; per-ticker order-book failures degrade to missing prices.

use chrono::{NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::cache::{ManifestCache, OrderbookCache, SnapshotDiskCache};
use crate::clients::{ConsensusFeed, ExchangeFeed, KalshiClient, UnabatedClient};
use crate::config::ScanConfig;
use crate::consensus::{ConsensusExtractor, ExtractedSlate};
use crate::error::ScanError;
use crate::matching::TeamCodeIndex;
use crate::models::MarketKind;
use crate::parsing::{
    parse_event_ticker, sibling_event_ticker, StructuredFields, TeamSides, TickerTitleParser,
};
use crate::selection::{CanonicalSelector, MarketConsensus};
use crate::types::{
    ConsensusLine, Game, MarketManifest, MoneylinePair, OrderbookSnapshot, Perspective,
    StrikeRecord,
};

const LISTING_TICKER_KEYS: [&str; 2] = ["ticker", "market_ticker"];
const LISTING_TITLE_KEYS: [&str; 3] = ["title", "market_title", "name"];
const EVENT_TICKER_KEYS: [&str; 2] = ["event_ticker", "ticker"];

/// Caches that outlive a single run: the cross-process snapshot file and
/// the in-process manifest map. Reusing one `FetchCaches` across runs is
/// what makes the TTLs observable.
pub struct FetchCaches {
    snapshot: SnapshotDiskCache,
    manifests: ManifestCache,
}

impl FetchCaches {
    pub fn new(cfg: &ScanConfig) -> Self {
        Self {
            snapshot: SnapshotDiskCache::new(cfg.snapshot_cache_path.clone(), cfg.snapshot_ttl),
            manifests: ManifestCache::new(cfg.manifest_ttl),
        }
    }
}

/// Uninitialized orchestrator: clients plus caches, nothing fetched yet.
pub struct FetchOrchestrator {
    cfg: Arc<ScanConfig>,
    consensus: Arc<dyn ConsensusFeed>,
    exchange: Arc<dyn ExchangeFeed>,
    caches: Arc<FetchCaches>,
    codes: Arc<TeamCodeIndex>,
}

impl FetchOrchestrator {
    pub fn new(
        cfg: Arc<ScanConfig>,
        consensus: Arc<dyn ConsensusFeed>,
        exchange: Arc<dyn ExchangeFeed>,
        caches: Arc<FetchCaches>,
        codes: Arc<TeamCodeIndex>,
    ) -> Self {
        Self { cfg, consensus, exchange, caches, codes }
    }

    /// Production wiring: env-configured feed clients, fresh caches, the
    /// built-in NBA team index.
    pub fn with_defaults(cfg: ScanConfig) -> anyhow::Result<Self> {
        let consensus = UnabatedClient::from_env(cfg.snapshot_timeout)?;
        let exchange = KalshiClient::new(cfg.fetch_timeout)?;
        let caches = FetchCaches::new(&cfg);
        Ok(Self::new(
            Arc::new(cfg),
            Arc::new(consensus),
            Arc::new(exchange),
            Arc::new(caches),
            Arc::new(TeamCodeIndex::nba_defaults()),
        ))
    }

    /// Fetch the consensus snapshot exactly once per run, consulting the
    /// cross-process cache first.
    pub async fn load_snapshot(self) -> Result<SnapshotLoaded, ScanError> {
        let snapshot = match self.caches.snapshot.load() {
            Some(payload) => {
                info!("consensus snapshot served from cache");
                payload
            }
            None => {
                info!("fetching consensus snapshot from {}", self.consensus.feed_name());
                let payload =
                    self.consensus.fetch_snapshot().await.map_err(ScanError::SnapshotFetch)?;
                self.caches.snapshot.store(&payload);
                payload
            }
        };
        Ok(SnapshotLoaded { orch: self, snapshot })
    }
}

/// Snapshot in hand; schedule not yet resolved.
pub struct SnapshotLoaded {
    orch: FetchOrchestrator,
    snapshot: Value,
}

impl SnapshotLoaded {
    /// Resolve the schedule from the already-loaded snapshot (no re-fetch)
    /// and validate canonical identity per game. `slate_date` defaults to
    /// today in the configured slate timezone.
    pub fn resolve_games(self, slate_date: Option<NaiveDate>) -> Result<GamesResolved, ScanError> {
        let cfg = &self.orch.cfg;
        let date = slate_date
            .unwrap_or_else(|| Utc::now().with_timezone(&cfg.slate_timezone).date_naive());

        let extractor = ConsensusExtractor::new(cfg, &self.orch.codes);
        let slate = extractor.extract(&self.snapshot, date)?;
        info!(
            "resolved {} game(s) for {} ({} consensus line(s), {} dropped)",
            slate.games.len(),
            date,
            slate.lines.len(),
            slate.dropped
        );
        Ok(GamesResolved { orch: self.orch, slate })
    }
}

/// Schedule resolved and validated; listings not yet discovered.
pub struct GamesResolved {
    orch: FetchOrchestrator,
    slate: ExtractedSlate,
}

impl GamesResolved {
    pub fn games(&self) -> &[Game] {
        &self.slate.games
    }

    /// Discover exchange listings once per game per market type, consulting
    /// the shared manifest cache first. A discovery fetch failure aborts the
    /// phase.
    pub async fn resolve_markets(mut self) -> Result<MarketsResolved, ScanError> {
        let parser = TickerTitleParser::new();
        let mut manifests: FxHashMap<String, Arc<MarketManifest>> = FxHashMap::default();
        let mut events: Option<Vec<Value>> = None;

        for idx in 0..self.slate.games.len() {
            let canonical_key = self.slate.games[idx].canonical_key.clone();

            if let Some(cached) = self.orch.caches.manifests.get(&canonical_key) {
                debug!("manifest cache hit for {}", canonical_key);
                let event_ticker = cached.event_ticker.clone();
                self.align_game(idx, &event_ticker);
                manifests.insert(self.slate.games[idx].event_id.clone(), cached);
                continue;
            }

            {
                let game = &self.slate.games[idx];
                if game.away.code.is_none() || game.home.code.is_none() {
                    warn!("skipping {}: unresolved team code(s)", canonical_key);
                    continue;
                }
            }

            if events.is_none() {
                let series = &self.orch.cfg.game_series;
                events = Some(self.orch.exchange.fetch_events(series).await.map_err(|source| {
                    ScanError::EventListing { series: series.clone(), source }
                })?);
            }

            let Some(event_ticker) = match_event_ticker(
                &self.slate.games[idx],
                &self.orch.cfg,
                events.as_deref().unwrap_or_default(),
            ) else {
                warn!("no exchange event found for {}", canonical_key);
                continue;
            };
            self.align_game(idx, &event_ticker);

            let game = self.slate.games[idx].clone();
            let manifest = Arc::new(self.discover_manifest(&game, &event_ticker, &parser).await?);
            self.orch.caches.manifests.put(canonical_key, Arc::clone(&manifest));
            manifests.insert(game.event_id, manifest);
        }

        info!("resolved listings for {}/{} game(s)", manifests.len(), self.slate.games.len());
        Ok(MarketsResolved { orch: self.orch, slate: self.slate, manifests })
    }

    /// The exchange event ticker is authoritative for away/home orientation.
    /// When the provider disagrees, swap the game's sides and flip the
    /// perspectives of its consensus lines to match.
    fn align_game(&mut self, idx: usize, event_ticker: &str) {
        let game = &mut self.slate.games[idx];
        if !orientation_reversed(game, event_ticker) {
            return;
        }
        debug!("swapping away/home for {} to match {}", game.canonical_key, event_ticker);
        std::mem::swap(&mut game.away, &mut game.home);

        let game_id = game.event_id.clone();
        for line in self.slate.lines.iter_mut().filter(|l| l.game_id == game_id) {
            line.perspective = match line.perspective {
                Perspective::Away => Perspective::Home,
                Perspective::Home => Perspective::Away,
                Perspective::Game => Perspective::Game,
            };
        }
    }

    async fn discover_manifest(
        &self,
        game: &Game,
        event_ticker: &str,
        parser: &TickerTitleParser,
    ) -> Result<MarketManifest, ScanError> {
        let teams = TeamSides {
            away_name: game.away.name.clone(),
            away_code: game.away.code.clone(),
            home_name: game.home.name.clone(),
            home_code: game.home.code.clone(),
        };

        let moneyline = match (game.away.code.as_deref(), game.home.code.as_deref()) {
            (Some(away), Some(home)) => Some(MoneylinePair {
                away_ticker: format!("{}-{}", event_ticker, away),
                home_ticker: format!("{}-{}", event_ticker, home),
            }),
            _ => None,
        };

        let spread_records = self
            .discover_strike_listings(MarketKind::Spread, event_ticker, parser, &teams)
            .await?;
        let total_records = self
            .discover_strike_listings(MarketKind::Total, event_ticker, parser, &teams)
            .await?;

        debug!(
            "{}: {} spread / {} total listing(s)",
            event_ticker,
            spread_records.len(),
            total_records.len()
        );

        Ok(MarketManifest {
            event_ticker: event_ticker.to_string(),
            moneyline,
            spread_records,
            total_records,
        })
    }

    async fn discover_strike_listings(
        &self,
        market: MarketKind,
        event_ticker: &str,
        parser: &TickerTitleParser,
        teams: &TeamSides,
    ) -> Result<Vec<StrikeRecord>, ScanError> {
        let series = market.series_ticker(&self.orch.cfg);
        let series_event = sibling_event_ticker(event_ticker, series);

        let listings =
            self.orch.exchange.fetch_markets(&series_event).await.map_err(|source| {
                ScanError::ManifestFetch { event_ticker: series_event.clone(), market, source }
            })?;

        let mut records = Vec::with_capacity(listings.len());
        for listing in &listings {
            let Some(ticker) = str_field(listing, &LISTING_TICKER_KEYS) else {
                warn!("listing without ticker under {}", series_event);
                continue;
            };
            let title = str_field(listing, &LISTING_TITLE_KEYS).unwrap_or_default();
            let fields = StructuredFields::from_listing(listing);
            records.push(parser.parse(market, &ticker, &title, &fields, Some(teams)));
        }
        Ok(records)
    }
}

/// Listings discovered; order books not yet prefetched.
pub struct MarketsResolved {
    orch: FetchOrchestrator,
    slate: ExtractedSlate,
    manifests: FxHashMap<String, Arc<MarketManifest>>,
}

impl MarketsResolved {
    /// Collect every ticker any consumer will read and fetch the books in
    /// one bounded-concurrency batch. Individual failures are recorded per
    /// ticker and degrade to missing price data.
    pub async fn prefetch_orderbooks(self) -> Result<ScanContext, ScanError> {
        let required = self.required_tickers();
        info!("prefetching {} order book(s)", required.len());

        let books = OrderbookCache::new();
        let exchange = Arc::clone(&self.orch.exchange);
        let fetches = stream::iter(required.into_iter().map(|ticker| {
            let exchange = Arc::clone(&exchange);
            async move {
                let result = exchange.fetch_orderbook(&ticker).await;
                (ticker, result)
            }
        }))
        .buffer_unordered(self.orch.cfg.prefetch_concurrency)
        .collect::<Vec<(String, anyhow::Result<OrderbookSnapshot>)>>()
        .await;

        for (ticker, result) in fetches {
            match result {
                Ok(book) => {
                    books.insert(book);
                }
                Err(err) => {
                    warn!("order book fetch failed for {}: {}", ticker, err);
                    books.record_failure(&ticker, err.to_string());
                }
            }
        }

        info!("prefetched {} order book(s)", books.len());
        Ok(ScanContext {
            cfg: Arc::clone(&self.orch.cfg),
            games: self.slate.games,
            lines: self.slate.lines,
            manifests: self.manifests,
            books,
            exchange: Arc::clone(&self.orch.exchange),
            runtime: Handle::current(),
        })
    }

    /// The union of tickers the three pipelines will read: the winner pair
    /// per game plus the selected nearest strikes per strike market. Runs
    /// the same deterministic selection the builders use.
    fn required_tickers(&self) -> Vec<String> {
        let selector = CanonicalSelector::new(self.orch.cfg.strikes_per_market);
        let mut required: FxHashSet<String> = FxHashSet::default();

        for game in &self.slate.games {
            let Some(manifest) = self.manifests.get(&game.event_id) else { continue };

            if let Some(pair) = &manifest.moneyline {
                required.insert(pair.away_ticker.clone());
                required.insert(pair.home_ticker.clone());
            }

            let away = self.line(game, MarketKind::Spread, Perspective::Away);
            let home = self.line(game, MarketKind::Spread, Perspective::Home);
            if away.is_some() || home.is_some() {
                if let Ok(selection) = selector.select(
                    game,
                    MarketConsensus::Spread { away, home },
                    &manifest.spread_records,
                ) {
                    required.extend(selection.selected.into_iter().map(|s| s.ticker));
                }
            }

            if let Some(total) = self.line(game, MarketKind::Total, Perspective::Game) {
                if let Ok(selection) = selector.select(
                    game,
                    MarketConsensus::Total { line: total },
                    &manifest.total_records,
                ) {
                    required.extend(selection.selected.into_iter().map(|s| s.ticker));
                }
            }
        }

        let mut tickers: Vec<String> = required.into_iter().collect();
        tickers.sort();
        tickers
    }

    fn line(&self, game: &Game, market: MarketKind, perspective: Perspective) -> Option<&ConsensusLine> {
        self.slate
            .lines
            .iter()
            .find(|l| l.game_id == game.event_id && l.market == market && l.perspective == perspective)
    }
}

/// Ready state: immutable scan inputs plus the prefetched order-book cache.
/// Builders read from here and never fetch on their own; dropping the
/// context discards the run.
pub struct ScanContext {
    cfg: Arc<ScanConfig>,
    games: Vec<Game>,
    lines: Vec<ConsensusLine>,
    manifests: FxHashMap<String, Arc<MarketManifest>>,
    books: OrderbookCache,
    exchange: Arc<dyn ExchangeFeed>,
    runtime: Handle,
}

impl ScanContext {
    pub fn config(&self) -> &ScanConfig {
        &self.cfg
    }

    pub fn games(&self) -> &[Game] {
        &self.games
    }

    pub fn manifest(&self, game_id: &str) -> Option<Arc<MarketManifest>> {
        self.manifests.get(game_id).map(Arc::clone)
    }

    pub fn line(
        &self,
        game_id: &str,
        market: MarketKind,
        perspective: Perspective,
    ) -> Option<&ConsensusLine> {
        self.lines
            .iter()
            .find(|l| l.game_id == game_id && l.market == market && l.perspective == perspective)
    }

    /// Read-only order-book lookup. A miss (which correct sequencing never
    /// produces) falls back to one synchronous fetch; tickers that already
    /// failed stay missing. Must be called from worker threads, not from
    /// inside the async runtime - the row builders satisfy this.
    pub fn orderbook(&self, ticker: &str) -> Option<Arc<OrderbookSnapshot>> {
        if let Some(book) = self.books.get(ticker) {
            return Some(book);
        }
        if self.books.failure(ticker).is_some() {
            return None;
        }

        warn!("order-book cache miss for {}, fetching synchronously", ticker);
        match self.runtime.block_on(self.exchange.fetch_orderbook(ticker)) {
            Ok(book) => Some(self.books.insert(book)),
            Err(err) => {
                warn!("fallback order-book fetch failed for {}: {}", ticker, err);
                self.books.record_failure(ticker, err.to_string());
                None
            }
        }
    }

    pub fn prefetched_books(&self) -> usize {
        self.books.len()
    }

    pub fn book_failure(&self, ticker: &str) -> Option<String> {
        self.books.failure(ticker)
    }
}

/// Assemble a ready context directly from parts, bypassing the fetch
/// phases. Test seam for the row builders.
#[cfg(test)]
pub(crate) fn scan_context_for_tests(
    cfg: Arc<ScanConfig>,
    games: Vec<Game>,
    lines: Vec<ConsensusLine>,
    manifests: FxHashMap<String, Arc<MarketManifest>>,
    books: OrderbookCache,
    exchange: Arc<dyn ExchangeFeed>,
) -> ScanContext {
    ScanContext { cfg, games, lines, manifests, books, exchange, runtime: Handle::current() }
}

/// Find the exchange event for a game: same exchange-local date, both team
/// codes in the ticker suffix.
fn match_event_ticker(game: &Game, cfg: &ScanConfig, events: &[Value]) -> Option<String> {
    let game_date = game.start_time.with_timezone(&cfg.ticker_timezone).date_naive();
    let away = game.away.code.as_deref()?;
    let home = game.home.code.as_deref()?;

    for event in events {
        let Some(ticker) = str_field(event, &EVENT_TICKER_KEYS) else { continue };
        let Some(parsed) = parse_event_ticker(&ticker) else { continue };
        if parsed.date != game_date {
            continue;
        }
        let codes = [parsed.away_code.as_str(), parsed.home_code.as_str()];
        if codes.contains(&away) && codes.contains(&home) {
            return Some(ticker);
        }
    }
    None
}

/// True when the provider's away/home ordering is the reverse of the
/// exchange event ticker's.
fn orientation_reversed(game: &Game, event_ticker: &str) -> bool {
    match parse_event_ticker(event_ticker) {
        Some(parsed) => {
            game.away.code.as_deref() == Some(parsed.home_code.as_str())
                && game.home.code.as_deref() == Some(parsed.away_code.as_str())
        }
        None => false,
    }
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockConsensus {
        snapshot: Value,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConsensusFeed for MockConsensus {
        async fn fetch_snapshot(&self) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }

        fn feed_name(&self) -> &str {
            "mock-consensus"
        }
    }

    #[derive(Default)]
    struct MockExchange {
        events: Vec<Value>,
        markets: FxHashMap<String, Vec<Value>>,
        books: FxHashMap<String, OrderbookSnapshot>,
        failing_tickers: Vec<String>,
        event_calls: AtomicUsize,
        market_calls: AtomicUsize,
        book_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExchangeFeed for MockExchange {
        async fn fetch_events(&self, _series: &str) -> anyhow::Result<Vec<Value>> {
            self.event_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.events.clone())
        }

        async fn fetch_markets(&self, event_ticker: &str) -> anyhow::Result<Vec<Value>> {
            self.market_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.markets.get(event_ticker).cloned().unwrap_or_default())
        }

        async fn fetch_orderbook(&self, ticker: &str) -> anyhow::Result<OrderbookSnapshot> {
            self.book_calls.lock().push(ticker.to_string());
            if self.failing_tickers.iter().any(|t| t == ticker) {
                return Err(anyhow!("simulated outage"));
            }
            Ok(self
                .books
                .get(ticker)
                .cloned()
                .unwrap_or_else(|| OrderbookSnapshot { ticker: ticker.to_string(), ..Default::default() }))
        }

        fn feed_name(&self) -> &str {
            "mock-exchange"
        }
    }

    fn snapshot() -> Value {
        json!({
            "teams": {
                "7": { "name": "Los Angeles Clippers" },
                "12": { "name": "Brooklyn Nets" }
            },
            "gameOddsEvents": {
                "lg3:pt1:pregame": [
                    {
                        "id": 9001,
                        "eventStart": "2026-01-10T00:30:00Z",
                        "eventTeams": {
                            "0": { "id": 7, "rotationNumber": 501 },
                            "1": { "id": 12, "rotationNumber": 502 }
                        },
                        "gameOddsMarketSourcesLines": {
                            "si0:ms49:an0": {
                                "bt1": { "americanPrice": -250 },
                                "bt2": { "line": -6.5, "americanPrice": -108 },
                                "bt3": { "line": 224.5, "americanPrice": -110 }
                            },
                            "si1:ms49:an0": {
                                "bt1": { "americanPrice": 210 },
                                "bt2": { "line": 6.5, "americanPrice": -112 }
                            }
                        }
                    }
                ]
            }
        })
    }

    fn listing(ticker: &str, title: &str) -> Value {
        json!({ "ticker": ticker, "title": title })
    }

    fn exchange() -> MockExchange {
        let mut markets = FxHashMap::default();
        markets.insert(
            "KXNBASPREAD-26JAN09LACBKN".to_string(),
            vec![
                listing("KXNBASPREAD-26JAN09LACBKN-LAC3", "Los Angeles C wins by over 3.5 Points?"),
                listing("KXNBASPREAD-26JAN09LACBKN-LAC6", "Los Angeles C wins by over 6.5 Points?"),
                listing("KXNBASPREAD-26JAN09LACBKN-BKN3", "Brooklyn wins by over 3.5 Points?"),
            ],
        );
        markets.insert(
            "KXNBATOTAL-26JAN09LACBKN".to_string(),
            vec![
                listing("KXNBATOTAL-26JAN09LACBKN-OVER224", "Will there be over 224.5 points?"),
                listing("KXNBATOTAL-26JAN09LACBKN-OVER230", "Will there be over 230.5 points?"),
            ],
        );

        let mut books = FxHashMap::default();
        for ticker in [
            "KXNBAGAME-26JAN09LACBKN-LAC",
            "KXNBAGAME-26JAN09LACBKN-BKN",
            "KXNBASPREAD-26JAN09LACBKN-LAC3",
            "KXNBASPREAD-26JAN09LACBKN-LAC6",
            "KXNBATOTAL-26JAN09LACBKN-OVER224",
            "KXNBATOTAL-26JAN09LACBKN-OVER230",
        ] {
            books.insert(
                ticker.to_string(),
                OrderbookSnapshot {
                    ticker: ticker.to_string(),
                    yes_bids: vec![crate::types::PriceLevel { price: 44, size: 120 }],
                    no_bids: vec![crate::types::PriceLevel { price: 54, size: 10 }],
                },
            );
        }

        MockExchange {
            events: vec![json!({ "event_ticker": "KXNBAGAME-26JAN09LACBKN" })],
            markets,
            books,
            ..Default::default()
        }
    }

    fn test_cfg(tag: &str) -> ScanConfig {
        ScanConfig {
            snapshot_cache_path: std::env::temp_dir()
                .join(format!("courtedge_orch_{}_{}.json", tag, std::process::id())),
            ..ScanConfig::default()
        }
    }

    fn slate_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 9).unwrap()
    }

    async fn ready_context(
        cfg: ScanConfig,
        consensus: Arc<MockConsensus>,
        exchange: Arc<MockExchange>,
        caches: Arc<FetchCaches>,
    ) -> ScanContext {
        FetchOrchestrator::new(
            Arc::new(cfg),
            consensus,
            exchange,
            caches,
            Arc::new(TeamCodeIndex::nba_defaults()),
        )
        .load_snapshot()
        .await
        .unwrap()
        .resolve_games(Some(slate_date()))
        .unwrap()
        .resolve_markets()
        .await
        .unwrap()
        .prefetch_orderbooks()
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_staging_prefetches_all_required_books() {
        let cfg = test_cfg("staging");
        let _ = std::fs::remove_file(&cfg.snapshot_cache_path);
        let consensus =
            Arc::new(MockConsensus { snapshot: snapshot(), calls: AtomicUsize::new(0) });
        let exchange = Arc::new(exchange());
        let caches = Arc::new(FetchCaches::new(&cfg));
        let path = cfg.snapshot_cache_path.clone();

        let ctx =
            ready_context(cfg, Arc::clone(&consensus), Arc::clone(&exchange), caches).await;

        assert_eq!(ctx.games().len(), 1);
        let manifest = ctx.manifest("9001").unwrap();
        assert_eq!(manifest.event_ticker, "KXNBAGAME-26JAN09LACBKN");
        assert_eq!(manifest.spread_records.len(), 3);
        assert_eq!(manifest.total_records.len(), 2);

        // ML pair + 2 spread strikes (LAC3/LAC6) + 2 total strikes.
        assert_eq!(ctx.prefetched_books(), 6);
        let book_calls = exchange.book_calls.lock().len();
        assert_eq!(book_calls, 6);

        // Reads are cache hits, no further fetches.
        let ctx = Arc::new(ctx);
        let ctx2 = Arc::clone(&ctx);
        let book = tokio::task::spawn_blocking(move || {
            ctx2.orderbook("KXNBASPREAD-26JAN09LACBKN-LAC6")
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(book.yes_bids.len(), 1);
        assert_eq!(exchange.book_calls.lock().len(), book_calls);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_snapshot_fetched_once_within_ttl() {
        let cfg = test_cfg("snapshot_ttl");
        let _ = std::fs::remove_file(&cfg.snapshot_cache_path);
        let consensus =
            Arc::new(MockConsensus { snapshot: snapshot(), calls: AtomicUsize::new(0) });
        let exchange = Arc::new(exchange());
        let caches = Arc::new(FetchCaches::new(&cfg));
        let path = cfg.snapshot_cache_path.clone();

        let _ctx = ready_context(
            cfg.clone(),
            Arc::clone(&consensus),
            Arc::clone(&exchange),
            Arc::clone(&caches),
        )
        .await;
        assert_eq!(consensus.calls.load(Ordering::SeqCst), 1);
        let market_calls = exchange.market_calls.load(Ordering::SeqCst);
        assert_eq!(market_calls, 2); // spread + total discovery

        // Second run within both TTLs: no snapshot call, no re-discovery.
        let _ctx = ready_context(cfg, Arc::clone(&consensus), Arc::clone(&exchange), caches).await;
        assert_eq!(consensus.calls.load(Ordering::SeqCst), 1);
        assert_eq!(exchange.market_calls.load(Ordering::SeqCst), market_calls);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_ticker_failure_degrades_to_missing_price() {
        let cfg = test_cfg("degrade");
        let _ = std::fs::remove_file(&cfg.snapshot_cache_path);
        let consensus =
            Arc::new(MockConsensus { snapshot: snapshot(), calls: AtomicUsize::new(0) });
        let mut mock = exchange();
        mock.failing_tickers = vec!["KXNBASPREAD-26JAN09LACBKN-LAC6".to_string()];
        let exchange = Arc::new(mock);
        let caches = Arc::new(FetchCaches::new(&cfg));
        let path = cfg.snapshot_cache_path.clone();

        let ctx =
            ready_context(cfg, Arc::clone(&consensus), Arc::clone(&exchange), caches).await;

        assert_eq!(ctx.prefetched_books(), 5);
        assert!(ctx.book_failure("KXNBASPREAD-26JAN09LACBKN-LAC6").is_some());

        // Known-failed ticker stays missing without a new fetch.
        let calls_before = exchange.book_calls.lock().len();
        let ctx = Arc::new(ctx);
        let ctx2 = Arc::clone(&ctx);
        let book = tokio::task::spawn_blocking(move || {
            ctx2.orderbook("KXNBASPREAD-26JAN09LACBKN-LAC6")
        })
        .await
        .unwrap();
        assert!(book.is_none());
        assert_eq!(exchange.book_calls.lock().len(), calls_before);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_cache_miss_triggers_single_fallback_fetch() {
        let cfg = test_cfg("fallback");
        let _ = std::fs::remove_file(&cfg.snapshot_cache_path);
        let consensus =
            Arc::new(MockConsensus { snapshot: snapshot(), calls: AtomicUsize::new(0) });
        let exchange = Arc::new(exchange());
        let caches = Arc::new(FetchCaches::new(&cfg));
        let path = cfg.snapshot_cache_path.clone();

        let ctx = Arc::new(
            ready_context(cfg, Arc::clone(&consensus), Arc::clone(&exchange), caches).await,
        );

        let calls_before = exchange.book_calls.lock().len();
        let ctx2 = Arc::clone(&ctx);
        let book =
            tokio::task::spawn_blocking(move || ctx2.orderbook("KXNBAGAME-26JAN09LACBKN-XXX"))
                .await
                .unwrap();
        assert!(book.is_some());
        assert_eq!(exchange.book_calls.lock().len(), calls_before + 1);

        // Now cached: a second read fetches nothing.
        let ctx2 = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || ctx2.orderbook("KXNBAGAME-26JAN09LACBKN-XXX"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exchange.book_calls.lock().len(), calls_before + 1);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_orientation_swapped_to_match_event_ticker() {
        // Provider lists Brooklyn as away; the event ticker says LAC is.
        let mut payload = snapshot();
        let event = &mut payload["gameOddsEvents"]["lg3:pt1:pregame"][0];
        event["eventTeams"]["0"]["id"] = json!(12);
        event["eventTeams"]["1"]["id"] = json!(7);

        let cfg = test_cfg("orientation");
        let _ = std::fs::remove_file(&cfg.snapshot_cache_path);
        let consensus = Arc::new(MockConsensus { snapshot: payload, calls: AtomicUsize::new(0) });
        let exchange = Arc::new(exchange());
        let caches = Arc::new(FetchCaches::new(&cfg));
        let path = cfg.snapshot_cache_path.clone();

        let ctx =
            ready_context(cfg, Arc::clone(&consensus), Arc::clone(&exchange), caches).await;
        let game = &ctx.games()[0];
        assert_eq!(game.away.code.as_deref(), Some("LAC"));
        assert_eq!(game.home.code.as_deref(), Some("BKN"));

        // Consensus perspectives follow the swap: the -250 favorite (side
        // index 0, now the home side) is quoted from the home perspective.
        let home_ml = ctx.line("9001", MarketKind::Moneyline, Perspective::Home).unwrap();
        assert_eq!(home_ml.juice, Some(-250));

        let _ = std::fs::remove_file(path);
    }
}
