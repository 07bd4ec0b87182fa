//! Typed failures for the scan phases.
//!
//! Phase-level failures (snapshot, schedule, market discovery) abort the run
//! and surface here. Smaller failures stay attached to their unit: per-game
//! validation drops only that game, per-ticker order-book failures degrade
//! to missing prices, and selection failures carry their own diagnostic
//! type in the selection module.

use thiserror::Error;

use crate::models::MarketKind;

/// Run-level scan failures.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The consensus snapshot could not be fetched. Aborts the run.
    #[error("consensus snapshot fetch failed: {0}")]
    SnapshotFetch(#[source] anyhow::Error),

    /// The snapshot payload had no usable event collection for the league.
    #[error("no event collection found for league prefix {league_prefix}")]
    SnapshotShape { league_prefix: String },

    /// Exchange listing discovery failed. Aborts the market phase.
    #[error("market discovery failed for {event_ticker} ({market}): {source}")]
    ManifestFetch {
        event_ticker: String,
        market: MarketKind,
        #[source]
        source: anyhow::Error,
    },

    /// Exchange event listing failed. Aborts the market phase.
    #[error("event listing failed for series {series}: {source}")]
    EventListing {
        series: String,
        #[source]
        source: anyhow::Error,
    },

    /// A game is missing a canonical identity component. Fatal for the game
    /// only; the extractor logs it loudly and drops the game.
    #[error("game missing canonical identity: {missing} (context: {context})")]
    InvalidGame { missing: &'static str, context: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::InvalidGame {
            missing: "event id",
            context: "LAC @ BKN".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("event id"));
        assert!(msg.contains("LAC @ BKN"));
    }

    #[test]
    fn test_manifest_error_carries_market() {
        let err = ScanError::ManifestFetch {
            event_ticker: "KXNBASPREAD-26JAN09LACBKN".to_string(),
            market: MarketKind::Spread,
            source: anyhow::anyhow!("timeout"),
        };
        assert!(err.to_string().contains("spread"));
    }
}
