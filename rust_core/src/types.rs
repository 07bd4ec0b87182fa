//! Core value objects shared across the scanner.
//!
//! Everything here is immutable once produced: the orchestrator owns the raw
//! payloads, and these derived records are handed downstream read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{ContractSide, MarketKind};

/// One team's identity inside a game record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRef {
    /// Consensus provider team id.
    pub provider_id: i64,
    /// Display name from the provider's team dictionary.
    pub name: String,
    /// Exchange team code (e.g. "LAC"), when resolvable.
    pub code: Option<String>,
    /// Sportsbook rotation number, used only for the presentation sort.
    pub rotation: Option<u32>,
}

/// A scheduled game, created once per schedule resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    /// Provider event id. Part of the canonical identity.
    pub event_id: String,
    /// Scheduled start, UTC. Part of the canonical identity.
    pub start_time: DateTime<Utc>,
    pub away: TeamRef,
    pub home: TeamRef,
    /// `{LEAGUE}_{YYYYMMDD}_{A}_{B}`, codes sorted, date in exchange-local time.
    pub canonical_key: String,
}

/// Which perspective a consensus line is quoted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    Away,
    Home,
    /// Game-level line (totals).
    Game,
}

/// One consensus line for one game and market type.
///
/// Moneyline values are fair probabilities (0-1); spread values are signed
/// team lines; total values are game totals with `Perspective::Game`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusLine {
    pub game_id: String,
    pub market: MarketKind,
    pub perspective: Perspective,
    pub value: f64,
    /// American-odds juice on the line, when the provider quotes it.
    pub juice: Option<i32>,
}

/// Identity half of a strike record: a team code or a total direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeSide {
    Team(String),
    Over,
    Under,
}

impl fmt::Display for StrikeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeSide::Team(code) => f.write_str(code),
            StrikeSide::Over => f.write_str("over"),
            StrikeSide::Under => f.write_str("under"),
        }
    }
}

/// Which parsing tier produced a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    Ticker,
    StructuredField,
    TitleRegex,
}

/// A fully resolved strike listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedStrike {
    pub side: StrikeSide,
    pub strike: f64,
    /// Where the identity came from (ticker suffix or title fallback).
    pub side_source: ParseSource,
    /// Where the magnitude came from (structured field or title text).
    pub strike_source: ParseSource,
}

/// Outcome of parsing one listing. Unresolved listings are retained, never
/// discarded, so selection can still observe them in diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ParseOutcome {
    Resolved(ResolvedStrike),
    Unresolved { reason: String },
}

/// One exchange listing, normalized. The bucket digits from the ticker
/// suffix index a discrete strike ladder; they are kept for diagnostics and
/// never used as the strike value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeRecord {
    pub ticker: String,
    pub title: String,
    pub market: MarketKind,
    pub bucket: Option<u32>,
    pub outcome: ParseOutcome,
}

impl StrikeRecord {
    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome, ParseOutcome::Resolved(_))
    }

    pub fn side(&self) -> Option<&StrikeSide> {
        match &self.outcome {
            ParseOutcome::Resolved(r) => Some(&r.side),
            ParseOutcome::Unresolved { .. } => None,
        }
    }

    pub fn strike_value(&self) -> Option<f64> {
        match &self.outcome {
            ParseOutcome::Resolved(r) => Some(r.strike),
            ParseOutcome::Unresolved { .. } => None,
        }
    }
}

/// One strike chosen by the canonical selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedStrike {
    pub ticker: String,
    pub title: String,
    pub strike: f64,
    /// Contract side expressing the canonical exposure on this listing.
    pub contract_side: ContractSide,
}

/// The single reporting perspective for one game and market type, plus the
/// nearest strikes. Never represents both sides of one consensus line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalSelection {
    pub game_id: String,
    pub market: MarketKind,
    pub canonical_side: StrikeSide,
    /// Ascending by distance to the consensus value, at most N entries.
    pub selected: Vec<SelectedStrike>,
}

/// One resting bid level: price in cents (1-99) and size in contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: u8,
    pub size: u32,
}

/// A bid-only order book. Both sides carry resting bids only; asks are
/// always derived from the opposing side, never read directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub ticker: String,
    pub yes_bids: Vec<PriceLevel>,
    pub no_bids: Vec<PriceLevel>,
}

impl OrderbookSnapshot {
    pub fn bids(&self, side: ContractSide) -> &[PriceLevel] {
        match side {
            ContractSide::Yes => &self.yes_bids,
            ContractSide::No => &self.no_bids,
        }
    }

    /// Highest-priced bid on a side. Ordering of the wire arrays is not
    /// assumed; the maximum is found explicitly.
    pub fn best_bid(&self, side: ContractSide) -> Option<PriceLevel> {
        let bids = self.bids(side);
        let top = bids.iter().map(|l| l.price).max()?;
        let size = bids.iter().filter(|l| l.price == top).map(|l| l.size).sum();
        Some(PriceLevel { price: top, size })
    }
}

/// Executable pricing for one side of one contract, derived from the
/// opposing side's bids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingResult {
    pub ticker: String,
    pub side: ContractSide,
    /// Best derived ask in cents, None when the opposing side has no bids.
    pub best_price: Option<u8>,
    /// best_price - 1, floored at 1 (None below the floor).
    pub inside_price: Option<u8>,
    /// Fee-adjusted break-even probability taking the best ask.
    pub taker_break_even: Option<f64>,
    /// Fee-adjusted break-even probability posting at the inside price.
    pub maker_break_even: Option<f64>,
    /// Size resting at the opposing best bid.
    pub liquidity: u32,
}

/// Execution scenario an EV figure is quoted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvScenario {
    /// Take the best derived ask, paying the taker fee on wins.
    Take,
    /// Post one cent inside the ask and pay the maker fee if filled.
    PostInside,
}

/// Expected value per contract for one scenario. Both positive and negative
/// results are emitted; filtering is the caller's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvResult {
    pub ticker: String,
    pub side: ContractSide,
    pub scenario: EvScenario,
    /// Dollars per contract.
    pub ev_per_contract: f64,
}

/// Quoted numbers for one side of a row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideQuote {
    /// Resting price in cents, when the book has one.
    pub price_cents: Option<u8>,
    /// Fee-adjusted break-even probability at that price.
    pub break_even: Option<f64>,
    /// Queue-jump price one cent above the resting bid, when it would not
    /// cross the derived ask.
    pub jump_cents: Option<u8>,
    pub jump_break_even: Option<f64>,
    pub liquidity: u32,
}

/// One presentation row. The persisted shape is not a public contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueRow {
    pub market: MarketKind,
    pub game_id: String,
    pub canonical_key: String,
    pub start_time: DateTime<Utc>,
    pub rotation: Option<u32>,
    pub away_team: String,
    pub home_team: String,
    /// Formatted consensus line, e.g. "PHI -3 -107" or "O 221.5 -110".
    pub consensus: String,
    /// Formatted selected strike, None for moneylines.
    pub strike: Option<String>,
    /// Contract ticker the row prices (event ticker for moneyline rows).
    pub ticker: String,
    pub title: Option<String>,
    pub canonical_label: String,
    pub canonical_quote: SideQuote,
    pub opposing_label: String,
    pub opposing_quote: SideQuote,
    /// EVs across sides and scenarios, unfiltered.
    pub evs: Vec<EvResult>,
}

/// The manifest of exchange listings discovered for one game, shared by all
/// market-type consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketManifest {
    pub event_ticker: String,
    pub moneyline: Option<MoneylinePair>,
    pub spread_records: Vec<StrikeRecord>,
    pub total_records: Vec<StrikeRecord>,
}

/// The away/home winner-market ticker pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneylinePair {
    pub away_ticker: String,
    pub home_ticker: String,
}
