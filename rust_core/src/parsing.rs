//! Ticker and title parsing for exchange listings.
//!
//! A listing's identity (team code or over/under direction) and its strike
//! magnitude are independent facts. The ticker suffix carries identity plus
//! a bucket index into a discrete strike ladder; the exact decimal strike
//! lives in structured fields or the title text. The bucket is never used
//! as the strike value.
//!
//! Parsing is total: every listing produces a `StrikeRecord`, and listings
//! that defeat all tiers are retained as unresolved with a reason.

use chrono::NaiveDate;
use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::sync::OnceLock;

use log::{debug, warn};

use crate::models::MarketKind;
use crate::types::{ParseOutcome, ParseSource, ResolvedStrike, StrikeRecord, StrikeSide};
use crate::matching::TeamCodeIndex;

const MONTHS: [(&str, u32); 12] = [
    ("JAN", 1),
    ("FEB", 2),
    ("MAR", 3),
    ("APR", 4),
    ("MAY", 5),
    ("JUN", 6),
    ("JUL", 7),
    ("AUG", 8),
    ("SEP", 9),
    ("OCT", 10),
    ("NOV", 11),
    ("DEC", 12),
];

fn team_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z]{2,4}?)(\d+)$").expect("team suffix regex"))
}

fn direction_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(OVER|UNDER)(\d+)$").expect("direction suffix regex"))
}

fn bare_digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)$").expect("digits regex"))
}

fn margin_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)wins\s+by\s+over\s+(\d+(?:\.\d+)?)\s*points?").expect("margin title regex")
    })
}

fn directional_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(over|under|total)\s+(\d+(?:\.\d+)?)").expect("directional value regex")
    })
}

fn label_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(over|under)?\s*(\d+(?:\.\d+)?)").expect("label value regex")
    })
}

fn title_team_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^([a-z0-9 .'-]+?)\s+wins\s+by").expect("title prefix regex"))
}

/// Structured listing fields that may carry the exact strike, in the order
/// they are preferred. Field names vary by listing vintage, so every
/// accessor tries several.
#[derive(Debug, Clone, Default)]
pub struct StructuredFields {
    pub subtitle: Option<String>,
    pub yes_label: Option<String>,
    pub no_label: Option<String>,
    pub strike: Option<f64>,
    pub floor_strike: Option<f64>,
    pub cap_strike: Option<f64>,
}

impl StructuredFields {
    /// Pull known structured fields out of a raw listing payload.
    pub fn from_listing(market: &Value) -> Self {
        fn text(market: &Value, keys: &[&str]) -> Option<String> {
            keys.iter()
                .filter_map(|k| market.get(*k))
                .filter_map(Value::as_str)
                .map(str::trim)
                .find(|s| !s.is_empty())
                .map(str::to_string)
        }
        fn number(market: &Value, keys: &[&str]) -> Option<f64> {
            keys.iter().filter_map(|k| market.get(*k)).find_map(Value::as_f64)
        }

        Self {
            subtitle: text(market, &["subtitle", "market_subtitle", "yes_sub_title"]),
            yes_label: text(market, &["yes_title", "yesTitle"]),
            no_label: text(market, &["no_title", "noTitle"]),
            strike: number(market, &["strike", "strike_price", "strikePrice"]),
            floor_strike: number(market, &["floor_strike", "floor"]),
            cap_strike: number(market, &["cap_strike", "cap"]),
        }
    }
}

/// The game's team identities, used by the title fallback when a ticker
/// suffix defeats parsing.
#[derive(Debug, Clone, Default)]
pub struct TeamSides {
    pub away_name: String,
    pub away_code: Option<String>,
    pub home_name: String,
    pub home_code: Option<String>,
}

/// Parsed event-ticker identity: `{SERIES}-{YYMONDD}{AWAY}{HOME}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTicker {
    pub series: String,
    pub date: NaiveDate,
    pub away_code: String,
    pub home_code: String,
}

/// Parse an event ticker. The date is the exchange's local date; the final
/// six letters are the away/home team codes.
pub fn parse_event_ticker(event_ticker: &str) -> Option<EventTicker> {
    let ticker = event_ticker.trim().to_uppercase();
    let (series, token) = ticker.split_once('-')?;
    if token.len() < 13 {
        return None;
    }

    let yy: i32 = token.get(0..2)?.parse().ok()?;
    let mmm = token.get(2..5)?;
    let dd: u32 = token.get(5..7)?.parse().ok()?;
    let month = MONTHS.iter().find(|(name, _)| *name == mmm)?.1;
    let date = NaiveDate::from_ymd_opt(2000 + yy, month, dd)?;

    let rest = token.get(7..)?;
    if rest.len() < 6 || !rest.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let codes = &rest[rest.len() - 6..];

    Some(EventTicker {
        series: series.to_string(),
        date,
        away_code: codes[..3].to_string(),
        home_code: codes[3..].to_string(),
    })
}

/// Rewrite an event ticker into a sibling series, e.g. the winner-series
/// event ticker into the margin-series one for the same game.
pub fn sibling_event_ticker(event_ticker: &str, to_series: &str) -> String {
    match event_ticker.split_once('-') {
        Some((_, rest)) => format!("{}-{}", to_series, rest),
        None => format!("{}-{}", to_series, event_ticker),
    }
}

/// Total parser over exchange listings. Failures are logged once per
/// distinct pattern so one unparsable ladder does not flood the log.
#[derive(Debug, Default)]
pub struct TickerTitleParser {
    seen_failures: Mutex<FxHashSet<String>>,
}

impl TickerTitleParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one listing into a `StrikeRecord`. Never panics, never drops
    /// the listing.
    pub fn parse(
        &self,
        market: MarketKind,
        ticker: &str,
        title: &str,
        fields: &StructuredFields,
        teams: Option<&TeamSides>,
    ) -> StrikeRecord {
        let suffix = ticker.rsplit('-').next().unwrap_or("");

        // Tier 1: ticker suffix. Identity plus ladder bucket, never the
        // strike itself.
        let (ticker_side, bucket) = parse_suffix(market, suffix);

        // Tier 2: structured fields, preferred for the exact strike.
        let mut strike = None;
        let mut strike_source = ParseSource::StructuredField;
        let mut text_direction: Option<(StrikeSide, ParseSource)> = None;
        if let Some((value, direction)) = structured_strike(fields) {
            strike = Some(value);
            text_direction = direction.map(|d| (d, ParseSource::StructuredField));
        }

        // Tier 3: title text.
        if strike.is_none() {
            if let Some((value, direction)) = title_strike(market, title) {
                strike = Some(value);
                strike_source = ParseSource::TitleRegex;
                if text_direction.is_none() {
                    text_direction = direction.map(|d| (d, ParseSource::TitleRegex));
                }
            }
        }

        // Identity fallback when the suffix defeated parsing.
        let (side, side_source) = match ticker_side {
            Some(side) => (Some(side), ParseSource::Ticker),
            None => match market {
                MarketKind::Spread => (title_team_side(title, teams), ParseSource::TitleRegex),
                MarketKind::Total | MarketKind::Moneyline => match text_direction {
                    Some((direction, source)) => (Some(direction), source),
                    None => (None, ParseSource::TitleRegex),
                },
            },
        };

        let outcome = match (side, strike) {
            (Some(side), Some(strike)) => ParseOutcome::Resolved(ResolvedStrike {
                side,
                strike,
                side_source,
                strike_source,
            }),
            (None, Some(_)) => self.unresolved(market, suffix, title, "no side identity"),
            (Some(_), None) => self.unresolved(market, suffix, title, "no strike magnitude"),
            (None, None) => self.unresolved(market, suffix, title, "no side or strike"),
        };

        StrikeRecord {
            ticker: ticker.to_string(),
            title: title.to_string(),
            market,
            bucket,
            outcome,
        }
    }

    fn unresolved(
        &self,
        market: MarketKind,
        suffix: &str,
        title: &str,
        reason: &str,
    ) -> ParseOutcome {
        let pattern = format!("{}:{}:{}", market, collapse_digits(suffix), reason);
        if self.seen_failures.lock().insert(pattern.clone()) {
            warn!(
                "unresolved {} listing (suffix {:?}, title {:?}): {}",
                market, suffix, title, reason
            );
        } else {
            debug!("unresolved {} listing {:?}: {}", market, suffix, reason);
        }
        ParseOutcome::Unresolved { reason: reason.to_string() }
    }
}

/// Suffix identity: team code or total direction, plus the bucket digits.
fn parse_suffix(market: MarketKind, suffix: &str) -> (Option<StrikeSide>, Option<u32>) {
    match market {
        MarketKind::Spread | MarketKind::Moneyline => {
            if let Some(caps) = team_suffix_re().captures(suffix) {
                let side = StrikeSide::Team(caps[1].to_string());
                return (Some(side), caps[2].parse().ok());
            }
            // Winner listings carry a bare team code with no bucket.
            if market == MarketKind::Moneyline
                && !suffix.is_empty()
                && suffix.chars().all(|c| c.is_ascii_uppercase())
            {
                return (Some(StrikeSide::Team(suffix.to_string())), None);
            }
            (None, None)
        }
        MarketKind::Total => {
            if let Some(caps) = direction_suffix_re().captures(suffix) {
                let side = if &caps[1] == "OVER" { StrikeSide::Over } else { StrikeSide::Under };
                return (Some(side), caps[2].parse().ok());
            }
            if let Some(caps) = bare_digits_re().captures(suffix) {
                // Bucket only; direction must come from text.
                return (None, caps[1].parse().ok());
            }
            (None, None)
        }
    }
}

/// Exact strike from structured fields, with a direction when the label
/// spells one.
fn structured_strike(fields: &StructuredFields) -> Option<(f64, Option<StrikeSide>)> {
    for label in [&fields.subtitle, &fields.yes_label, &fields.no_label]
        .into_iter()
        .flatten()
    {
        if let Some(caps) = label_value_re().captures(label) {
            if let Ok(value) = caps[2].parse::<f64>() {
                let direction = caps.get(1).map(|d| match d.as_str().to_lowercase().as_str() {
                    "over" => StrikeSide::Over,
                    _ => StrikeSide::Under,
                });
                return Some((value, direction));
            }
        }
    }
    for numeric in [fields.strike, fields.floor_strike, fields.cap_strike].into_iter().flatten() {
        return Some((numeric, None));
    }
    None
}

/// Strike magnitude from the title. Margin titles ("wins by over 6.5
/// points") are tried before the generic directional form.
fn title_strike(market: MarketKind, title: &str) -> Option<(f64, Option<StrikeSide>)> {
    if market == MarketKind::Spread {
        if let Some(caps) = margin_title_re().captures(title) {
            if let Ok(value) = caps[1].parse::<f64>() {
                return Some((value, None));
            }
        }
    }
    let caps = directional_value_re().captures(title)?;
    let value: f64 = caps[2].parse().ok()?;
    let direction = match caps[1].to_lowercase().as_str() {
        "over" => Some(StrikeSide::Over),
        "under" => Some(StrikeSide::Under),
        _ => None,
    };
    Some((value, direction))
}

/// Recover a spread side from the title's leading team text.
fn title_team_side(title: &str, teams: Option<&TeamSides>) -> Option<StrikeSide> {
    let teams = teams?;
    let caps = title_team_prefix_re().captures(title)?;
    let fragment = caps[1].trim();

    if TeamCodeIndex::fragment_matches(fragment, &teams.away_name) {
        return teams.away_code.clone().map(StrikeSide::Team);
    }
    if TeamCodeIndex::fragment_matches(fragment, &teams.home_name) {
        return teams.home_code.clone().map(StrikeSide::Team);
    }
    // Last resort: the fragment may hold the code itself.
    let fragment_upper = fragment.to_uppercase();
    for code in [&teams.away_code, &teams.home_code].into_iter().flatten() {
        if fragment_upper.contains(code.as_str()) {
            return Some(StrikeSide::Team(code.clone()));
        }
    }
    None
}

fn collapse_digits(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii_digit() { '#' } else { c }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teams() -> TeamSides {
        TeamSides {
            away_name: "Los Angeles Clippers".to_string(),
            away_code: Some("LAC".to_string()),
            home_name: "Brooklyn Nets".to_string(),
            home_code: Some("BKN".to_string()),
        }
    }

    #[test]
    fn test_spread_side_from_ticker_strike_from_title() {
        let parser = TickerTitleParser::new();
        let record = parser.parse(
            MarketKind::Spread,
            "X-26JAN09LACBKN-LAC6",
            "Los Angeles C wins by over 6.5 Points?",
            &StructuredFields::default(),
            Some(&teams()),
        );
        assert_eq!(record.bucket, Some(6));
        match &record.outcome {
            ParseOutcome::Resolved(r) => {
                assert_eq!(r.side, StrikeSide::Team("LAC".to_string()));
                assert_eq!(r.strike, 6.5);
                assert_eq!(r.side_source, ParseSource::Ticker);
                assert_eq!(r.strike_source, ParseSource::TitleRegex);
            }
            other => panic!("expected resolved record, got {:?}", other),
        }
    }

    #[test]
    fn test_bucket_is_never_the_strike() {
        // Bucket 6 indexes a ladder; the strike is 6.5 from the title.
        let parser = TickerTitleParser::new();
        let record = parser.parse(
            MarketKind::Spread,
            "KXNBASPREAD-26JAN09LACBKN-LAC6",
            "Los Angeles C wins by over 6.5 Points?",
            &StructuredFields::default(),
            Some(&teams()),
        );
        assert_eq!(record.strike_value(), Some(6.5));
        assert_ne!(record.strike_value(), record.bucket.map(f64::from));
    }

    #[test]
    fn test_structured_field_preferred_over_title() {
        let parser = TickerTitleParser::new();
        let fields = StructuredFields {
            yes_label: Some("Over 224.5".to_string()),
            ..Default::default()
        };
        let record = parser.parse(
            MarketKind::Total,
            "KXNBATOTAL-26JAN09LACBKN-224",
            "Will there be over 220 points scored?",
            &fields,
            None,
        );
        match &record.outcome {
            ParseOutcome::Resolved(r) => {
                assert_eq!(r.strike, 224.5);
                assert_eq!(r.side, StrikeSide::Over);
                assert_eq!(r.strike_source, ParseSource::StructuredField);
            }
            other => panic!("expected resolved record, got {:?}", other),
        }
    }

    #[test]
    fn test_total_direction_from_ticker() {
        let parser = TickerTitleParser::new();
        let record = parser.parse(
            MarketKind::Total,
            "KXNBATOTAL-26JAN09LACBKN-OVER224",
            "224.5 or more points scored?",
            &StructuredFields { floor_strike: Some(224.5), ..Default::default() },
            None,
        );
        match &record.outcome {
            ParseOutcome::Resolved(r) => {
                assert_eq!(r.side, StrikeSide::Over);
                assert_eq!(r.side_source, ParseSource::Ticker);
                assert_eq!(r.strike, 224.5);
            }
            other => panic!("expected resolved record, got {:?}", other),
        }
        assert_eq!(record.bucket, Some(224));
    }

    #[test]
    fn test_title_fallback_recovers_side() {
        let parser = TickerTitleParser::new();
        // Malformed suffix: identity comes from the title prefix.
        let record = parser.parse(
            MarketKind::Spread,
            "KXNBASPREAD-26JAN09LACBKN-X9Z",
            "Brooklyn Nets wins by over 3.5 points?",
            &StructuredFields::default(),
            Some(&teams()),
        );
        match &record.outcome {
            ParseOutcome::Resolved(r) => {
                assert_eq!(r.side, StrikeSide::Team("BKN".to_string()));
                assert_eq!(r.side_source, ParseSource::TitleRegex);
                assert_eq!(r.strike, 3.5);
            }
            other => panic!("expected resolved record, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_listing_is_kept() {
        let parser = TickerTitleParser::new();
        let record = parser.parse(
            MarketKind::Spread,
            "KXNBASPREAD-26JAN09LACBKN-???",
            "Something unrecognizable",
            &StructuredFields::default(),
            Some(&teams()),
        );
        assert!(!record.is_resolved());
        assert_eq!(record.ticker, "KXNBASPREAD-26JAN09LACBKN-???");
        match &record.outcome {
            ParseOutcome::Unresolved { reason } => assert_eq!(reason, "no side or strike"),
            other => panic!("expected unresolved, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_is_total_over_arbitrary_input() {
        let parser = TickerTitleParser::new();
        for (ticker, title) in [
            ("", ""),
            ("-", "-"),
            ("A", "over points"),
            ("X-Y-OVER", "over over over"),
            ("X-Y-123ABC", "wins by over points?"),
        ] {
            let record =
                parser.parse(MarketKind::Total, ticker, title, &StructuredFields::default(), None);
            assert!(!record.is_resolved());
        }
    }

    #[test]
    fn test_event_ticker_parse() {
        let parsed = parse_event_ticker("KXNBAGAME-26JAN09LACBKN").unwrap();
        assert_eq!(parsed.series, "KXNBAGAME");
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
        assert_eq!(parsed.away_code, "LAC");
        assert_eq!(parsed.home_code, "BKN");

        assert!(parse_event_ticker("KXNBAGAME").is_none());
        assert!(parse_event_ticker("KXNBAGAME-26XXX09LACBKN").is_none());
        assert!(parse_event_ticker("KXNBAGAME-26JAN09LAC").is_none());
    }

    #[test]
    fn test_sibling_event_ticker() {
        assert_eq!(
            sibling_event_ticker("KXNBAGAME-26JAN09MILLAL", "KXNBASPREAD"),
            "KXNBASPREAD-26JAN09MILLAL"
        );
    }

    #[test]
    fn test_failure_logged_once_per_pattern() {
        let parser = TickerTitleParser::new();
        for n in 0..5 {
            let ticker = format!("KXNBASPREAD-26JAN09LACBKN-??{}", n);
            parser.parse(
                MarketKind::Spread,
                &ticker,
                "garbled",
                &StructuredFields::default(),
                None,
            );
        }
        // All five collapse to one pattern key.
        assert_eq!(parser.seen_failures.lock().len(), 1);
    }
}
