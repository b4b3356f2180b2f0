use regex::{Captures, Regex};
use std::sync::OnceLock;

use super::club::canonicalize_club_name;

/// One team-naming convention: a pattern plus how to read the series label
/// (and, when the convention carries one, the club prefix) out of a match.
pub struct SeriesRule {
    pub name: &'static str,
    pattern: Regex,
    series: fn(&Captures<'_>) -> String,
    club: fn(&Captures<'_>) -> Option<String>,
}

impl SeriesRule {
    fn new(
        name: &'static str,
        pattern: &str,
        series: fn(&Captures<'_>) -> String,
        club: fn(&Captures<'_>) -> Option<String>,
    ) -> Self {
        Self {
            name,
            // Patterns are compile-time constants covered by tests.
            pattern: Regex::new(pattern).expect("series rule pattern"),
            series,
            club,
        }
    }

    pub fn apply(&self, team_name: &str) -> Option<TeamNameParts> {
        let caps = self.pattern.captures(team_name)?;
        Some(TeamNameParts {
            rule: self.name,
            series: (self.series)(&caps),
            club: (self.club)(&caps),
        })
    }
}

/// A team name split by the first rule that recognised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamNameParts {
    pub rule: &'static str,
    pub series: String,
    /// Raw club prefix; `None` when the name is already a bare series label.
    pub club: Option<String>,
}

fn club_prefix(caps: &Captures<'_>) -> Option<String> {
    caps.name("club").map(|m| m.as_str().trim().to_string())
}

fn no_club(_: &Captures<'_>) -> Option<String> {
    None
}

/// Rules in priority order; the first match wins.
pub fn series_rules() -> &'static [SeriesRule] {
    static RULES: OnceLock<Vec<SeriesRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            // APTA Chicago: "Tennaqua - 6" is Chicago 6.
            SeriesRule::new(
                "dash_number",
                r"^(?P<club>.+?)\s+-\s+(?P<num>\d+[A-Za-z]?(?:\s+SW)?)$",
                |c| format!("Chicago {}", &c["num"]),
                club_prefix,
            ),
            SeriesRule::new(
                "canonical",
                r"^(?:Series|Chicago|Division)\s+\S+(?:\s+SW)?$",
                |c| c[0].to_string(),
                no_club,
            ),
            // NSTF: "Birchwood S2A"
            SeriesRule::new(
                "s_number",
                r"^(?P<club>.+?)\s+S(?P<num>\d+[A-Z]?)$",
                |c| format!("Series {}", &c["num"]),
                club_prefix,
            ),
            SeriesRule::new(
                "sunday_letter",
                r"^(?P<club>.+?)\s+Sunday\s+(?P<letter>[A-Z])$",
                |c| format!("Series {}", &c["letter"]),
                club_prefix,
            ),
            // CNSWPL: "Tennaqua 12", "Tennaqua 12b"
            SeriesRule::new(
                "trailing_number",
                r"^(?P<club>.+?)\s+(?P<num>\d+[A-Za-z]?)$",
                |c| format!("Series {}", &c["num"]),
                club_prefix,
            ),
        ]
    })
}

pub(crate) fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a team name with the first matching rule.
pub fn split_team_name(team_name: &str) -> Option<TeamNameParts> {
    let cleaned = collapse_whitespace(team_name);
    if cleaned.is_empty() {
        return None;
    }
    series_rules().iter().find_map(|rule| rule.apply(&cleaned))
}

/// Series label implied by a team name, or `None` when no convention matches
/// (series unknown, not an error).
pub fn extract_series_name(team_name: &str) -> Option<String> {
    split_team_name(team_name).map(|parts| parts.series)
}

/// Club base name implied by a team name. Returns `"Unknown"` for empty input
/// and for names that are a bare series label.
pub fn extract_club_name(team_name: &str) -> String {
    const UNKNOWN: &str = "Unknown";
    let cleaned = collapse_whitespace(team_name);
    if cleaned.is_empty() {
        return UNKNOWN.to_string();
    }
    let base = match split_team_name(&cleaned) {
        Some(TeamNameParts { club: Some(club), .. }) => club,
        Some(TeamNameParts { club: None, .. }) => return UNKNOWN.to_string(),
        None => cleaned,
    };
    let canonical = canonicalize_club_name(&base);
    if canonical.is_empty() {
        UNKNOWN.to_string()
    } else {
        canonical
    }
}
