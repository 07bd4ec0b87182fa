//! Market taxonomy for the value scanner.
//!
//! Defines the closed set of market types the scanner reconciles and the
//! contract-side vocabulary of a binary exchange. Keeping `MarketKind` a
//! closed enum means every canonical-side rule and series mapping is an
//! exhaustive match with no string-keyed fallthrough.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ScanConfig;

/// The three market types reconciled against consensus lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Which team wins the game outright.
    Moneyline,
    /// Whether a team wins by more than a points margin (strike).
    Spread,
    /// Whether the combined score clears a points threshold (strike).
    Total,
}

impl MarketKind {
    pub const ALL: [MarketKind; 3] = [MarketKind::Moneyline, MarketKind::Spread, MarketKind::Total];

    /// Exchange series ticker for this market type.
    pub fn series_ticker<'a>(&self, cfg: &'a ScanConfig) -> &'a str {
        match self {
            MarketKind::Moneyline => &cfg.game_series,
            MarketKind::Spread => &cfg.spread_series,
            MarketKind::Total => &cfg.total_series,
        }
    }

    /// Whether listings of this market type carry a numeric strike.
    pub fn has_strikes(&self) -> bool {
        match self {
            MarketKind::Moneyline => false,
            MarketKind::Spread | MarketKind::Total => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            MarketKind::Moneyline => "moneyline",
            MarketKind::Spread => "spread",
            MarketKind::Total => "total",
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Side of a binary contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractSide {
    Yes,
    No,
}

impl ContractSide {
    /// The opposing side of the same contract.
    pub fn opposite(&self) -> ContractSide {
        match self {
            ContractSide::Yes => ContractSide::No,
            ContractSide::No => ContractSide::Yes,
        }
    }
}

impl fmt::Display for ContractSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractSide::Yes => f.write_str("yes"),
            ContractSide::No => f.write_str("no"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_kind_serialization() {
        let json = serde_json::to_string(&MarketKind::Moneyline).unwrap();
        assert_eq!(json, "\"moneyline\"");

        let deserialized: MarketKind = serde_json::from_str("\"spread\"").unwrap();
        assert_eq!(deserialized, MarketKind::Spread);
    }

    #[test]
    fn test_series_ticker_mapping() {
        let cfg = ScanConfig::default();
        assert_eq!(MarketKind::Moneyline.series_ticker(&cfg), "KXNBAGAME");
        assert_eq!(MarketKind::Spread.series_ticker(&cfg), "KXNBASPREAD");
        assert_eq!(MarketKind::Total.series_ticker(&cfg), "KXNBATOTAL");
    }

    #[test]
    fn test_strike_bearing_kinds() {
        assert!(!MarketKind::Moneyline.has_strikes());
        assert!(MarketKind::Spread.has_strikes());
        assert!(MarketKind::Total.has_strikes());
    }

    #[test]
    fn test_contract_side_opposite() {
        assert_eq!(ContractSide::Yes.opposite(), ContractSide::No);
        assert_eq!(ContractSide::No.opposite(), ContractSide::Yes);
    }
}
