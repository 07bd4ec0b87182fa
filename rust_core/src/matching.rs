//! Sportsbook team-name to exchange team-code resolution.
//!
//! Consensus providers spell teams out ("Los Angeles Clippers"); the
//! exchange speaks three-letter codes ("LAC"). Resolution runs exact
//! normalized lookup first, then league name variations, then a fuzzy
//! Jaro-Winkler pass as a last resort.

use rustc_hash::FxHashMap;
use strsim::jaro_winkler;

/// Minimum Jaro-Winkler score accepted by the fuzzy fallback.
const FUZZY_MIN_SCORE: f64 = 0.88;

/// Maps normalized team names to exchange codes.
#[derive(Debug, Clone, Default)]
pub struct TeamCodeIndex {
    by_name: FxHashMap<String, String>,
}

impl TeamCodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index seeded with the NBA's thirty teams.
    pub fn nba_defaults() -> Self {
        let mut index = Self::new();
        for (name, code) in [
            ("Atlanta Hawks", "ATL"),
            ("Boston Celtics", "BOS"),
            ("Brooklyn Nets", "BKN"),
            ("Charlotte Hornets", "CHA"),
            ("Chicago Bulls", "CHI"),
            ("Cleveland Cavaliers", "CLE"),
            ("Dallas Mavericks", "DAL"),
            ("Denver Nuggets", "DEN"),
            ("Detroit Pistons", "DET"),
            ("Golden State Warriors", "GSW"),
            ("Houston Rockets", "HOU"),
            ("Indiana Pacers", "IND"),
            ("Los Angeles Clippers", "LAC"),
            ("Los Angeles Lakers", "LAL"),
            ("Memphis Grizzlies", "MEM"),
            ("Miami Heat", "MIA"),
            ("Milwaukee Bucks", "MIL"),
            ("Minnesota Timberwolves", "MIN"),
            ("New Orleans Pelicans", "NOP"),
            ("New York Knicks", "NYK"),
            ("Oklahoma City Thunder", "OKC"),
            ("Orlando Magic", "ORL"),
            ("Philadelphia 76ers", "PHI"),
            ("Phoenix Suns", "PHX"),
            ("Portland Trail Blazers", "POR"),
            ("Sacramento Kings", "SAC"),
            ("San Antonio Spurs", "SAS"),
            ("Toronto Raptors", "TOR"),
            ("Utah Jazz", "UTA"),
            ("Washington Wizards", "WAS"),
        ] {
            index.insert(name, code);
        }
        index
    }

    pub fn insert(&mut self, name: &str, code: &str) {
        self.by_name.insert(normalize(name), code.to_uppercase());
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Resolve a raw provider name to an exchange code.
    pub fn code_for(&self, raw: &str) -> Option<&str> {
        let norm = normalize(raw);
        if norm.is_empty() {
            return None;
        }
        if let Some(code) = self.by_name.get(&norm) {
            return Some(code);
        }
        for variation in variations(&norm) {
            if let Some(code) = self.by_name.get(&variation) {
                return Some(code);
            }
        }
        self.fuzzy_code(&norm)
    }

    /// Whether a free-text fragment (a title prefix like "los angeles c")
    /// plausibly names the given team.
    pub fn fragment_matches(fragment: &str, team_name: &str) -> bool {
        let frag = normalize(fragment);
        let name = normalize(team_name);
        if frag.is_empty() || name.is_empty() {
            return false;
        }
        if name.contains(&frag) || frag.contains(&name) {
            return true;
        }
        for variation in variations(&name) {
            if frag.contains(&variation) || variation.contains(&frag) {
                return true;
            }
        }
        jaro_winkler(&frag, &name) >= FUZZY_MIN_SCORE
    }

    fn fuzzy_code(&self, norm: &str) -> Option<&str> {
        let mut best: Option<(&str, f64)> = None;
        for (name, code) in &self.by_name {
            let score = jaro_winkler(norm, name);
            if score >= FUZZY_MIN_SCORE && best.map_or(true, |(_, s)| score > s) {
                best = Some((code, score));
            }
        }
        best.map(|(code, _)| code)
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Common spellings of a normalized team name: city abbreviations and the
/// bare nickname.
fn variations(norm: &str) -> Vec<String> {
    let mut out = Vec::new();
    if norm.contains("los angeles") {
        out.push(norm.replace("los angeles", "la"));
    }
    if norm.contains("new york") {
        out.push(norm.replace("new york", "ny"));
    }
    if norm.contains("golden state") {
        out.push(norm.replace("golden state", "gs"));
    }
    let words: Vec<&str> = norm.split(' ').collect();
    if words.len() > 1 {
        out.push(words[words.len() - 1].to_string());
    }
    out
}
