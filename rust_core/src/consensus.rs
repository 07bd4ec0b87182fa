//! Consensus snapshot extraction.
//!
//! The provider snapshot is only partially owned: field names vary by
//! vintage, so every read tries a priority list instead of assuming one
//! canonical key. Output is the slate's `Game` records plus per-game
//! `ConsensusLine`s keyed by team identity.

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, error, warn};
use serde_json::Value;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::matching::TeamCodeIndex;
use crate::models::MarketKind;
use crate::pricing::odds::american_to_prob;
use crate::types::{ConsensusLine, Game, Perspective, TeamRef};

const EVENT_START_KEYS: [&str; 4] = ["eventStart", "event_start", "startTime", "start_time"];
const EVENT_ID_KEYS: [&str; 5] = ["id", "eventId", "event_id", "gameId", "game_id"];
const TEAM_NAME_KEYS: [&str; 4] = ["name", "teamName", "displayName", "fullName"];
const ROTATION_KEYS: [&str; 3] = ["rotationNumber", "rotation", "roto"];
const MONEYLINE_PRICE_KEYS: [&str; 3] = ["americanPrice", "unabatedPrice", "price"];
const SPREAD_VALUE_KEYS: [&str; 4] = ["line", "spread", "value", "points"];
const TOTAL_VALUE_KEYS: [&str; 5] = ["line", "total", "value", "points", "overUnder"];
const JUICE_KEYS: [&str; 4] = ["americanPrice", "unabatedPrice", "price", "juice"];
const SPREAD_BLOCK_KEYS: [&str; 3] = ["bt2", "spread", "spreadLine"];

/// Everything extracted from one snapshot for one slate date.
#[derive(Debug, Clone, Default)]
pub struct ExtractedSlate {
    pub games: Vec<Game>,
    pub lines: Vec<ConsensusLine>,
    /// Events dropped by per-game identity validation.
    pub dropped: usize,
}

/// Turns a raw consensus snapshot into games and consensus lines.
pub struct ConsensusExtractor<'a> {
    cfg: &'a ScanConfig,
    codes: &'a TeamCodeIndex,
}

impl<'a> ConsensusExtractor<'a> {
    pub fn new(cfg: &'a ScanConfig, codes: &'a TeamCodeIndex) -> Self {
        Self { cfg, codes }
    }

    /// Extract the slate for one date. Fails only when the snapshot has no
    /// event collection for the league; individual malformed events are
    /// dropped with loud logging.
    pub fn extract(&self, snapshot: &Value, slate_date: NaiveDate) -> Result<ExtractedSlate, ScanError> {
        let events = self.league_events(snapshot).ok_or_else(|| ScanError::SnapshotShape {
            league_prefix: self.cfg.league_key_prefix(),
        })?;
        let teams_dict = snapshot.get("teams");

        let mut slate = ExtractedSlate::default();

        for event in events {
            let start = match event_start(event) {
                Some(start) => start,
                None => {
                    error!("event missing start time, dropping: {}", compact(event));
                    slate.dropped += 1;
                    continue;
                }
            };
            if start.with_timezone(&self.cfg.slate_timezone).date_naive() != slate_date {
                continue;
            }

            match self.game_from_event(event, teams_dict, start) {
                Ok(game) => {
                    self.extract_lines(event, &game, &mut slate.lines);
                    slate.games.push(game);
                }
                Err(err) => {
                    error!("dropping game failing identity validation: {}", err);
                    slate.dropped += 1;
                }
            }
        }

        debug!(
            "extracted {} game(s), {} line(s), dropped {}",
            slate.games.len(),
            slate.lines.len(),
            slate.dropped
        );
        Ok(slate)
    }

    /// The league's pregame full-game event collection, located by key
    /// pattern rather than a fixed key.
    fn league_events<'b>(&self, snapshot: &'b Value) -> Option<&'b Vec<Value>> {
        let collections = snapshot.get("gameOddsEvents")?.as_object()?;
        let prefix = self.cfg.league_key_prefix();
        let period = format!(":{}:", self.cfg.period_tag);
        collections
            .iter()
            .find(|(key, _)| key.starts_with(&prefix) && key.contains(&period) && key.contains("pregame"))
            .and_then(|(_, value)| value.as_array())
    }

    fn game_from_event(
        &self,
        event: &Value,
        teams_dict: Option<&Value>,
        start: DateTime<Utc>,
    ) -> Result<Game, ScanError> {
        let event_id = str_or_number(event, &EVENT_ID_KEYS).ok_or_else(|| ScanError::InvalidGame {
            missing: "event id",
            context: compact(event),
        })?;

        let away = self.team_ref(event, teams_dict, 0).ok_or_else(|| ScanError::InvalidGame {
            missing: "away team",
            context: event_id.clone(),
        })?;
        let home = self.team_ref(event, teams_dict, 1).ok_or_else(|| ScanError::InvalidGame {
            missing: "home team",
            context: event_id.clone(),
        })?;

        let canonical_key = self.canonical_key(start, &away, &home);

        Ok(Game { event_id, start_time: start, away, home, canonical_key })
    }

    fn team_ref(&self, event: &Value, teams_dict: Option<&Value>, side_idx: u8) -> Option<TeamRef> {
        let info = event.get("eventTeams")?.get(side_idx.to_string())?;
        let provider_id = info.get("id")?.as_i64()?;

        let name = teams_dict
            .and_then(|d| d.get(provider_id.to_string()))
            .and_then(|team| {
                TEAM_NAME_KEYS.iter().filter_map(|k| team.get(*k)).find_map(Value::as_str)
            })
            .map(str::to_string)
            .unwrap_or_else(|| {
                warn!("no name for team id {}, using id", provider_id);
                provider_id.to_string()
            });

        let rotation = ROTATION_KEYS
            .iter()
            .filter_map(|k| info.get(*k))
            .find_map(Value::as_u64)
            .map(|r| r as u32);

        let code = self.codes.code_for(&name).map(str::to_string);
        if code.is_none() {
            warn!("no exchange code resolved for team {:?}", name);
        }

        Some(TeamRef { provider_id, name, code, rotation })
    }

    /// `{LEAGUE}_{YYYYMMDD}_{A}_{B}`, codes sorted alphabetically, date in
    /// the exchange's local timezone so evening games match ticker dates.
    fn canonical_key(&self, start: DateTime<Utc>, away: &TeamRef, home: &TeamRef) -> String {
        let date = start.with_timezone(&self.cfg.ticker_timezone).format("%Y%m%d");
        let mut tags = [key_tag(away), key_tag(home)];
        tags.sort();
        format!("{}_{}_{}_{}", self.cfg.league_code, date, tags[0], tags[1])
    }

    fn extract_lines(&self, event: &Value, game: &Game, lines: &mut Vec<ConsensusLine>) {
        let market_lines = match event.get("gameOddsMarketSourcesLines").and_then(Value::as_object) {
            Some(obj) => obj,
            None => return,
        };
        let marker = self.cfg.source_key_marker();
        let mut total_emitted = false;

        for (key, block) in market_lines {
            if !key.contains(&marker) {
                continue;
            }
            let perspective = match side_index(key) {
                Some(0) => Perspective::Away,
                Some(1) => Perspective::Home,
                _ => continue,
            };

            // Moneyline (bt1): price doubles as the fair-probability source.
            if let Some(odds) = block.get("bt1").and_then(|line| int_field(line, &MONEYLINE_PRICE_KEYS)) {
                lines.push(ConsensusLine {
                    game_id: game.event_id.clone(),
                    market: MarketKind::Moneyline,
                    perspective,
                    value: american_to_prob(odds),
                    juice: Some(odds),
                });
            }

            // Spread (bt2 and its aliases).
            if let Some(line) = SPREAD_BLOCK_KEYS.iter().filter_map(|k| block.get(*k)).next() {
                if let Some(value) = float_field(line, &SPREAD_VALUE_KEYS) {
                    lines.push(ConsensusLine {
                        game_id: game.event_id.clone(),
                        market: MarketKind::Spread,
                        perspective,
                        value,
                        juice: int_field(line, &JUICE_KEYS),
                    });
                }
            }

            // Total (bt3): game-level, emitted once per game.
            if !total_emitted {
                if let Some(line) = block.get("bt3") {
                    if let Some(value) = float_field(line, &TOTAL_VALUE_KEYS) {
                        lines.push(ConsensusLine {
                            game_id: game.event_id.clone(),
                            market: MarketKind::Total,
                            perspective: Perspective::Game,
                            value,
                            juice: int_field(line, &JUICE_KEYS),
                        });
                        total_emitted = true;
                    }
                }
            }
        }
    }
}

fn event_start(event: &Value) -> Option<DateTime<Utc>> {
    let raw = EVENT_START_KEYS.iter().filter_map(|k| event.get(*k)).find_map(Value::as_str)?;
    DateTime::parse_from_rfc3339(&raw.replace('Z', "+00:00"))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Side index from a line key prefix, e.g. "si1:ms49:an0" -> 1.
fn side_index(key: &str) -> Option<u8> {
    let token = key.split(':').next()?;
    token.strip_prefix("si")?.parse().ok()
}

fn str_or_number(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| value.get(*k)).find_map(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Numeric field that may arrive as a number or a decorated string
/// (" -6.5 ").
fn float_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| value.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn int_field(value: &Value, keys: &[&str]) -> Option<i32> {
    keys.iter().filter_map(|k| value.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_i64().map(|i| i as i32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn key_tag(team: &TeamRef) -> String {
    match &team.code {
        Some(code) => code.clone(),
        None => team.name.to_uppercase().replace(' ', ""),
    }
}

fn compact(value: &Value) -> String {
    let mut s = value.to_string();
    s.truncate(120);
    s
}
