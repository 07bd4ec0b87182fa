//! Row builders: the three market-type pipelines.
//!
//! Once the orchestrator is Ready the pipelines run concurrently on the
//! rayon worker pool. All inputs are prefetched and immutable, so each
//! builder is pure computation plus read-only cache lookups. Rows for
//! games without usable data are omitted, never fabricated.

use log::{debug, error};
use rayon::prelude::*;
use std::sync::Arc;

use crate::ev::EvEngine;
use crate::models::{ContractSide, MarketKind};
use crate::orchestrator::ScanContext;
use crate::pricing::odds::american_to_prob;
use crate::pricing::{MakerQuote, OrderbookPricer};
use crate::selection::{canonical_spread_pov, CanonicalSelector, MarketConsensus};
use crate::types::{
    ConsensusLine, EvResult, Game, Perspective, SideQuote, TeamRef, ValueRow,
};

/// All rows of one scan, per market type, presentation-sorted.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub moneylines: Vec<ValueRow>,
    pub spreads: Vec<ValueRow>,
    pub totals: Vec<ValueRow>,
}

impl ScanReport {
    pub fn rows(&self, market: MarketKind) -> &[ValueRow] {
        match market {
            MarketKind::Moneyline => &self.moneylines,
            MarketKind::Spread => &self.spreads,
            MarketKind::Total => &self.totals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.moneylines.is_empty() && self.spreads.is_empty() && self.totals.is_empty()
    }
}

/// Run the three pipelines off the async runtime (they block on rayon and
/// may issue guarded fallback fetches).
pub async fn run_pipelines(ctx: Arc<ScanContext>) -> ScanReport {
    match tokio::task::spawn_blocking(move || build_report(&ctx)).await {
        Ok(report) => report,
        Err(err) => {
            error!("row builders aborted: {}", err);
            ScanReport::default()
        }
    }
}

/// Build every market's rows on the worker pool.
pub fn build_report(ctx: &ScanContext) -> ScanReport {
    let mut report = ScanReport::default();
    let built: Vec<(MarketKind, Vec<ValueRow>)> = MarketKind::ALL
        .par_iter()
        .map(|kind| (*kind, build_rows(ctx, *kind)))
        .collect();

    for (kind, rows) in built {
        match kind {
            MarketKind::Moneyline => report.moneylines = rows,
            MarketKind::Spread => report.spreads = rows,
            MarketKind::Total => report.totals = rows,
        }
    }
    report
}

/// One market's rows, presentation-sorted by rotation then start time.
pub fn build_rows(ctx: &ScanContext, market: MarketKind) -> Vec<ValueRow> {
    let pricer = OrderbookPricer::new(ctx.config().fees);
    let engine = EvEngine::new(ctx.config().fees);

    let mut rows = match market {
        MarketKind::Moneyline => moneyline_rows(ctx, &pricer, &engine),
        MarketKind::Spread => spread_rows(ctx, &pricer, &engine),
        MarketKind::Total => total_rows(ctx, &pricer, &engine),
    };

    rows.sort_by(|a, b| {
        (a.rotation.is_none(), a.rotation.unwrap_or(0), a.start_time)
            .cmp(&(b.rotation.is_none(), b.rotation.unwrap_or(0), b.start_time))
    });
    rows
}

/// Winner rows. Exposure to a team is priced from the no-bids of the
/// opposing team's contract, read directly with no complement conversion;
/// EVs come from the ask derived on the same contract.
fn moneyline_rows(ctx: &ScanContext, pricer: &OrderbookPricer, engine: &EvEngine) -> Vec<ValueRow> {
    let mut rows = Vec::new();

    for game in ctx.games() {
        let Some(manifest) = ctx.manifest(&game.event_id) else { continue };
        let Some(pair) = manifest.moneyline.clone() else { continue };

        let away_line = ctx.line(&game.event_id, MarketKind::Moneyline, Perspective::Away);
        let home_line = ctx.line(&game.event_id, MarketKind::Moneyline, Perspective::Home);
        if away_line.is_none() && home_line.is_none() {
            debug!("no consensus moneyline for {}", game.canonical_key);
            continue;
        }

        // Away exposure lives on the home contract's no side, and vice
        // versa.
        let home_book = ctx.orderbook(&pair.home_ticker);
        let away_book = ctx.orderbook(&pair.away_ticker);

        let away_quote = home_book
            .as_deref()
            .map(|b| side_quote(pricer.maker_quote(b, ContractSide::No)))
            .unwrap_or_default();
        let home_quote = away_book
            .as_deref()
            .map(|b| side_quote(pricer.maker_quote(b, ContractSide::No)))
            .unwrap_or_default();

        let mut evs: Vec<EvResult> = Vec::new();
        if let (Some(line), Some(book)) = (away_line, home_book.as_deref()) {
            evs.extend(engine.evaluate_all(line.value, &pricer.price(book, ContractSide::No)));
        }
        if let (Some(line), Some(book)) = (home_line, away_book.as_deref()) {
            evs.extend(engine.evaluate_all(line.value, &pricer.price(book, ContractSide::No)));
        }

        rows.push(ValueRow {
            market: MarketKind::Moneyline,
            game_id: game.event_id.clone(),
            canonical_key: game.canonical_key.clone(),
            start_time: game.start_time,
            rotation: game.away.rotation,
            away_team: game.away.name.clone(),
            home_team: game.home.name.clone(),
            consensus: moneyline_consensus(game, away_line, home_line),
            strike: None,
            ticker: manifest.event_ticker.clone(),
            title: None,
            canonical_label: side_label(&game.away),
            canonical_quote: away_quote,
            opposing_label: side_label(&game.home),
            opposing_quote: home_quote,
            evs,
        });
    }
    rows
}

/// Margin rows: one per selected strike, quoted from the canonical
/// (favorite) perspective. The opposing exposure is the no side of the
/// same contract.
fn spread_rows(ctx: &ScanContext, pricer: &OrderbookPricer, engine: &EvEngine) -> Vec<ValueRow> {
    let selector = CanonicalSelector::new(ctx.config().strikes_per_market);
    let mut rows = Vec::new();

    for game in ctx.games() {
        let Some(manifest) = ctx.manifest(&game.event_id) else { continue };
        let away = ctx.line(&game.event_id, MarketKind::Spread, Perspective::Away);
        let home = ctx.line(&game.event_id, MarketKind::Spread, Perspective::Home);
        if away.is_none() && home.is_none() {
            debug!("no consensus spread for {}", game.canonical_key);
            continue;
        }

        let selection = match selector.select(
            game,
            MarketConsensus::Spread { away, home },
            &manifest.spread_records,
        ) {
            Ok(selection) => selection,
            Err(failure) => {
                debug!("excluding {} from spreads: {}", game.canonical_key, failure);
                continue;
            }
        };

        let (canonical_team, opposing_team, line) = match canonical_spread_pov(away, home) {
            Some(Perspective::Away) => (&game.away, &game.home, away),
            _ => (&game.home, &game.away, home),
        };
        let Some(line) = line else { continue };
        let p_win = line.juice.map(american_to_prob);
        let canonical_code = side_label(canonical_team);

        for strike in &selection.selected {
            let book = ctx.orderbook(&strike.ticker);
            let (canonical_quote, opposing_quote, evs) = quotes_and_evs(
                pricer,
                engine,
                book.as_deref(),
                strike.contract_side,
                p_win,
            );

            rows.push(ValueRow {
                market: MarketKind::Spread,
                game_id: game.event_id.clone(),
                canonical_key: game.canonical_key.clone(),
                start_time: game.start_time,
                rotation: game.away.rotation,
                away_team: game.away.name.clone(),
                home_team: game.home.name.clone(),
                consensus: format!(
                    "{} {}{}",
                    canonical_code,
                    format_line(line.value),
                    juice_suffix(line.juice)
                ),
                strike: Some(format!(
                    "{} {}{}",
                    canonical_code,
                    if line.value < 0.0 { "-" } else { "+" },
                    trim_number(strike.strike)
                )),
                ticker: strike.ticker.clone(),
                title: Some(strike.title.clone()),
                canonical_label: canonical_code.clone(),
                canonical_quote,
                opposing_label: side_label(opposing_team),
                opposing_quote,
                evs,
            });
        }
    }
    rows
}

/// Total rows: canonical side is always over; under is the no side of the
/// same contract.
fn total_rows(ctx: &ScanContext, pricer: &OrderbookPricer, engine: &EvEngine) -> Vec<ValueRow> {
    let selector = CanonicalSelector::new(ctx.config().strikes_per_market);
    let mut rows = Vec::new();

    for game in ctx.games() {
        let Some(manifest) = ctx.manifest(&game.event_id) else { continue };
        let Some(line) = ctx.line(&game.event_id, MarketKind::Total, Perspective::Game) else {
            debug!("no consensus total for {}", game.canonical_key);
            continue;
        };

        let selection = match selector.select(
            game,
            MarketConsensus::Total { line },
            &manifest.total_records,
        ) {
            Ok(selection) => selection,
            Err(failure) => {
                debug!("excluding {} from totals: {}", game.canonical_key, failure);
                continue;
            }
        };

        let p_win = line.juice.map(american_to_prob);

        for strike in &selection.selected {
            let book = ctx.orderbook(&strike.ticker);
            let (canonical_quote, opposing_quote, evs) = quotes_and_evs(
                pricer,
                engine,
                book.as_deref(),
                strike.contract_side,
                p_win,
            );

            rows.push(ValueRow {
                market: MarketKind::Total,
                game_id: game.event_id.clone(),
                canonical_key: game.canonical_key.clone(),
                start_time: game.start_time,
                rotation: game.away.rotation,
                away_team: game.away.name.clone(),
                home_team: game.home.name.clone(),
                consensus: format!("O {}{}", trim_number(line.value), juice_suffix(line.juice)),
                strike: Some(format!("O {}", trim_number(strike.strike))),
                ticker: strike.ticker.clone(),
                title: Some(strike.title.clone()),
                canonical_label: "Over".to_string(),
                canonical_quote,
                opposing_label: "Under".to_string(),
                opposing_quote,
                evs,
            });
        }
    }
    rows
}

/// Both side quotes plus the canonical side's EVs for one contract.
fn quotes_and_evs(
    pricer: &OrderbookPricer,
    engine: &EvEngine,
    book: Option<&crate::types::OrderbookSnapshot>,
    canonical_side: ContractSide,
    p_win: Option<f64>,
) -> (SideQuote, SideQuote, Vec<EvResult>) {
    let Some(book) = book else {
        return (SideQuote::default(), SideQuote::default(), Vec::new());
    };

    let canonical_quote = side_quote(pricer.maker_quote(book, canonical_side));
    let opposing_quote = side_quote(pricer.maker_quote(book, canonical_side.opposite()));

    let evs = match p_win {
        Some(p) => engine.evaluate_all(p, &pricer.price(book, canonical_side)),
        None => Vec::new(),
    };
    (canonical_quote, opposing_quote, evs)
}

fn side_quote(quote: MakerQuote) -> SideQuote {
    SideQuote {
        price_cents: quote.bid_cents,
        break_even: quote.break_even,
        jump_cents: quote.jump_cents,
        jump_break_even: quote.jump_break_even,
        liquidity: quote.liquidity,
    }
}

fn side_label(team: &TeamRef) -> String {
    team.code.clone().unwrap_or_else(|| team.name.clone())
}

fn moneyline_consensus(
    game: &Game,
    away: Option<&ConsensusLine>,
    home: Option<&ConsensusLine>,
) -> String {
    let fmt = |team: &TeamRef, line: Option<&ConsensusLine>| match line {
        Some(line) => match line.juice {
            Some(juice) => format!("{} {:+}", side_label(team), juice),
            None => format!("{} {:.3}", side_label(team), line.value),
        },
        None => format!("{} n/a", side_label(team)),
    };
    format!("{} / {}", fmt(&game.away, away), fmt(&game.home, home))
}

/// "-3", "+6.5": sign always shown, trailing ".0" trimmed.
fn format_line(value: f64) -> String {
    format!("{}{}", if value < 0.0 { "-" } else { "+" }, trim_number(value.abs()))
}

fn trim_number(value: f64) -> String {
    if (value - value.trunc()).abs() < f64::EPSILON {
        format!("{}", value.trunc() as i64)
    } else {
        format!("{}", value)
    }
}

fn juice_suffix(juice: Option<i32>) -> String {
    match juice {
        Some(j) => format!(" {:+}", j),
        None => String::new(),
    }
}
