use regex::Regex;
use std::sync::OnceLock;
use strsim::jaro_winkler;

use super::series::collapse_whitespace;

/// Minimum Jaro-Winkler similarity for two distinct club names to be flagged
/// as a possible duplicate.
pub const CLUB_SIMILARITY_THRESHOLD: f64 = 0.93;

/// Known misspellings and location-suffixed variants, compared case-insensitively.
const CLUB_ALIASES: &[(&str, &str)] = &[
    ("Park RIdge CC", "Park Ridge CC"),
    ("Park Ridge Country Club", "Park Ridge CC"),
    ("LifeSport-Lshire", "LifeSport"),
    ("LifeSport Lshire", "LifeSport"),
    ("Lifesport-Libertyville", "LifeSport"),
    ("Midt-Bannockburn", "Midtown"),
    ("Valley Lo Sports Club", "Valley Lo"),
    ("Winnetka Comm House", "Winnetka Community House"),
];

fn trailing_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<base>.*\S)\s+\d+[A-Za-z]?$").expect("club suffix pattern"))
}

fn alias_for(name: &str) -> Option<&'static str> {
    CLUB_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map(|(_, canonical)| *canonical)
}

/// Fold a raw club label onto the name stored in `clubs`: collapse
/// whitespace, drop a trailing series number ("Glenbrook RC 8") and apply
/// the alias table.
pub fn canonicalize_club_name(raw: &str) -> String {
    let cleaned = collapse_whitespace(raw);
    if let Some(canonical) = alias_for(&cleaned) {
        return canonical.to_string();
    }
    let stripped = match trailing_suffix().captures(&cleaned) {
        Some(caps) => caps["base"].to_string(),
        None => cleaned,
    };
    alias_for(&stripped)
        .map(str::to_string)
        .unwrap_or(stripped)
}

/// Closest existing club name at or above [`CLUB_SIMILARITY_THRESHOLD`].
/// Comparison ignores case, so a spelling that differs only in case scores 1.0.
pub fn similar_club<'a, I>(name: &str, existing: I) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = name.to_ascii_lowercase();
    existing
        .into_iter()
        .map(|candidate| (candidate, jaro_winkler(&needle, &candidate.to_ascii_lowercase())))
        .filter(|(_, score)| *score >= CLUB_SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
