//! Canonical perspective selection.
//!
//! One reporting side per game per market type: the spread favorite (or the
//! side with data, away preferred) and always "over" for totals. The
//! opposing exposure is the other side of the same contract, never a second
//! row. From the canonical side's listings the N strikes nearest the
//! consensus value are selected deterministically.

use log::warn;
use thiserror::Error;

use crate::models::{ContractSide, MarketKind};
use crate::types::{
    CanonicalSelection, ConsensusLine, Game, Perspective, SelectedStrike, StrikeRecord, StrikeSide,
};

/// Zero canonical candidates for a game/market. Recoverable: excludes the
/// game from that market type only; the diagnostics say what was there.
#[derive(Debug, Error)]
#[error(
    "no canonical candidates for game {game_id} ({market}): {candidate_count} candidate(s) \
     across {record_count} record(s), side {canonical_side:?}"
)]
pub struct SelectionFailure {
    pub game_id: String,
    pub market: MarketKind,
    pub canonical_side: Option<StrikeSide>,
    pub candidate_count: usize,
    pub record_count: usize,
    /// Raw titles of every record seen, for diagnosis.
    pub raw_titles: Vec<String>,
}

/// Consensus inputs for one strike market of one game.
#[derive(Debug, Clone, Copy)]
pub enum MarketConsensus<'a> {
    Spread { away: Option<&'a ConsensusLine>, home: Option<&'a ConsensusLine> },
    Total { line: &'a ConsensusLine },
}

/// Which team holds the canonical spread perspective.
///
/// The favorite (negative line) wins; with no favorite quoted, the side
/// with a line, away preferred.
pub fn canonical_spread_pov(
    away: Option<&ConsensusLine>,
    home: Option<&ConsensusLine>,
) -> Option<Perspective> {
    match (away.map(|l| l.value), home.map(|l| l.value)) {
        (Some(a), _) if a < 0.0 => Some(Perspective::Away),
        (_, Some(h)) if h < 0.0 => Some(Perspective::Home),
        (Some(_), _) => Some(Perspective::Away),
        (_, Some(_)) => Some(Perspective::Home),
        (None, None) => None,
    }
}

/// Picks one canonical side and the N nearest strikes.
#[derive(Debug, Clone)]
pub struct CanonicalSelector {
    n: usize,
}

impl CanonicalSelector {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    pub fn select(
        &self,
        game: &Game,
        consensus: MarketConsensus<'_>,
        records: &[StrikeRecord],
    ) -> Result<CanonicalSelection, SelectionFailure> {
        let (market, canonical_side, target) = match consensus {
            MarketConsensus::Spread { away, home } => {
                let (team, line) = match canonical_spread_pov(away, home) {
                    Some(Perspective::Away) => (&game.away, away),
                    Some(Perspective::Home) => (&game.home, home),
                    _ => {
                        return Err(self.failure(game, MarketKind::Spread, None, records));
                    }
                };
                let (Some(code), Some(line)) = (team.code.clone(), line) else {
                    return Err(self.failure(game, MarketKind::Spread, None, records));
                };
                (MarketKind::Spread, StrikeSide::Team(code), line.value.abs())
            }
            MarketConsensus::Total { line } => (MarketKind::Total, StrikeSide::Over, line.value),
        };

        let mut candidates: Vec<(f64, f64, &StrikeRecord)> = records
            .iter()
            .filter(|r| r.side() == Some(&canonical_side))
            .filter_map(|r| r.strike_value().map(|s| ((s - target).abs(), s, r)))
            .collect();

        if candidates.is_empty() {
            return Err(self.failure(game, market, Some(canonical_side), records));
        }

        // Ascending distance; equal distances resolve to the lower strike.
        candidates.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        let selected = candidates
            .into_iter()
            .take(self.n)
            .map(|(_, strike, record)| SelectedStrike {
                ticker: record.ticker.clone(),
                title: record.title.clone(),
                strike,
                contract_side: ContractSide::Yes,
            })
            .collect();

        Ok(CanonicalSelection {
            game_id: game.event_id.clone(),
            market,
            canonical_side,
            selected,
        })
    }

    fn failure(
        &self,
        game: &Game,
        market: MarketKind,
        canonical_side: Option<StrikeSide>,
        records: &[StrikeRecord],
    ) -> SelectionFailure {
        let failure = SelectionFailure {
            game_id: game.event_id.clone(),
            market,
            canonical_side,
            candidate_count: 0,
            record_count: records.len(),
            raw_titles: records.iter().map(|r| r.title.clone()).collect(),
        };
        if !records.is_empty() {
            warn!("{}; titles: {:?}", failure, failure.raw_titles);
        }
        failure
    }
}
