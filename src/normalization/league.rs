/// Known league spellings folded onto their canonical code. Keys are compared
/// after trimming and uppercasing.
const LEAGUE_ALIASES: &[(&str, &str)] = &[
    ("APTA", "APTA_CHICAGO"),
    ("APTA CHICAGO", "APTA_CHICAGO"),
    ("APTA-CHICAGO", "APTA_CHICAGO"),
    ("APTA_CHI", "APTA_CHICAGO"),
    ("CNSWPL", "CNSWPL"),
    ("CHICAGO NORTH SHORE WOMEN'S PLATFORM TENNIS LEAGUE", "CNSWPL"),
    ("NSTF", "NSTF"),
    ("NORTH SHORE TENNIS FOUNDATION", "NSTF"),
    ("CITA", "CITA"),
];

/// Canonical league codes with their display names, in the order the admin
/// seeding command inserts them.
pub const KNOWN_LEAGUES: &[(&str, &str)] = &[
    ("APTA_CHICAGO", "APTA Chicago"),
    ("APTA_NATIONAL", "APTA National"),
    ("CNSWPL", "Chicago North Shore Women's Platform Tennis League"),
    ("NSTF", "North Shore Tennis Foundation"),
    ("CITA", "Chicago Indoor Tennis Association"),
];

/// Canonicalize a raw league identifier: uppercase, then fold known aliases.
/// Unknown inputs pass through uppercased.
pub fn normalize_league_id(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    LEAGUE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, code)| (*code).to_string())
        .unwrap_or(upper)
}
