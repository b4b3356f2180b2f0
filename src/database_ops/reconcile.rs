//! Entity reconciler: folds every source record of one league into a single
//! plan of normalized series, clubs and teams.
//!
//! All sources are unioned. Match history regularly names series and teams
//! the player export never mentions, so nothing is dropped just because it
//! only appears in one file. When two records disagree about a team's series
//! or club, the first non-empty value wins (players load first).

use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;
use tracing::debug;

use crate::normalization::{
    canonicalize_club_name, extract_club_name, extract_series_name, series::collapse_whitespace,
};
use crate::sources::{SourceKind, SourceRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamCandidate {
    pub team_name: String,
    pub series: Option<String>,
    pub club: Option<String>,
    pub sources: BTreeSet<SourceKind>,
}

#[derive(Debug, Default)]
pub struct LeaguePlan {
    pub league: String,
    /// Series name -> sources that mention it, in first-seen order.
    pub series: IndexMap<String, BTreeSet<SourceKind>>,
    pub clubs: IndexSet<String>,
    pub teams: IndexMap<String, TeamCandidate>,
    pub records_used: usize,
    /// Records with neither a team nor a series to contribute.
    pub records_empty: usize,
    /// Later records that disagreed with an earlier non-empty value.
    pub conflicts: usize,
}

impl LeaguePlan {
    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    let cleaned = collapse_whitespace(raw?);
    (!cleaned.is_empty()).then_some(cleaned)
}

fn club_for(record: &SourceRecord, team: Option<&str>) -> Option<String> {
    if let Some(raw) = non_empty(record.club.as_deref()) {
        let canonical = canonicalize_club_name(&raw);
        if !canonical.is_empty() {
            return Some(canonical);
        }
    }
    let derived = extract_club_name(team?);
    (derived != "Unknown").then_some(derived)
}

/// Keep `current` when set; otherwise take `incoming`. Returns true when both
/// were set and disagree.
fn merge_first_wins(current: &mut Option<String>, incoming: Option<&String>) -> bool {
    match (current.as_ref(), incoming) {
        (None, Some(v)) => {
            *current = Some(v.clone());
            false
        }
        (Some(have), Some(v)) => have != v,
        _ => false,
    }
}

/// Build the plan for `league_code` from records already filtered to it.
pub fn build_league_plan(league_code: &str, records: &[SourceRecord]) -> LeaguePlan {
    let mut plan = LeaguePlan {
        league: league_code.to_string(),
        ..Default::default()
    };

    for record in records {
        let team = non_empty(record.team.as_deref());
        let series = non_empty(record.series.as_deref())
            .or_else(|| team.as_deref().and_then(extract_series_name));
        let club = club_for(record, team.as_deref());

        if team.is_none() && series.is_none() {
            plan.records_empty += 1;
            continue;
        }
        plan.records_used += 1;

        if let Some(s) = &series {
            plan.series.entry(s.clone()).or_default().insert(record.kind);
        }
        if let Some(c) = &club {
            plan.clubs.insert(c.clone());
        }
        let Some(team_name) = team else {
            continue;
        };

        let candidate = plan
            .teams
            .entry(team_name.clone())
            .or_insert_with(|| TeamCandidate {
                team_name: team_name.clone(),
                ..Default::default()
            });
        candidate.sources.insert(record.kind);
        let series_conflict = merge_first_wins(&mut candidate.series, series.as_ref());
        let club_conflict = merge_first_wins(&mut candidate.club, club.as_ref());
        if series_conflict || club_conflict {
            plan.conflicts += 1;
            debug!(
                league = %league_code,
                team = %team_name,
                source = %record.kind,
                kept_series = ?candidate.series,
                offered_series = ?series,
                kept_club = ?candidate.club,
                offered_club = ?club,
                "conflicting team attributes; keeping first seen"
            );
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(kind: SourceKind, series: Option<&str>, team: Option<&str>, club: Option<&str>) -> SourceRecord {
        SourceRecord {
            kind,
            league: Some("APTA".into()),
            series: series.map(Into::into),
            team: team.map(Into::into),
            club: club.map(Into::into),
        }
    }

    #[test]
    fn unions_series_across_sources() {
        let records = vec![
            rec(SourceKind::Players, Some("Series A"), Some("Winnetka Sunday A"), None),
            rec(SourceKind::Players, Some("Series B"), Some("Winnetka Sunday B"), None),
            rec(SourceKind::MatchHistory, None, Some("Wilmette Sunday B"), None),
            rec(SourceKind::MatchHistory, Some("Series C"), Some("Glencoe 9"), None),
        ];
        let plan = build_league_plan("NSTF", &records);
        let names: Vec<_> = plan.series_names().collect();
        assert_eq!(names, ["Series A", "Series B", "Series C"]);
        assert_eq!(
            plan.series["Series B"],
            BTreeSet::from([SourceKind::Players, SourceKind::MatchHistory])
        );
        assert_eq!(plan.teams.len(), 4);
    }

    #[test]
    fn derives_series_and_club_from_team_names() {
        let records = vec![rec(SourceKind::MatchHistory, None, Some("Tennaqua - 6"), None)];
        let plan = build_league_plan("APTA_CHICAGO", &records);
        let team = &plan.teams["Tennaqua - 6"];
        assert_eq!(team.series.as_deref(), Some("Chicago 6"));
        assert_eq!(team.club.as_deref(), Some("Tennaqua"));
        assert!(plan.clubs.contains("Tennaqua"));
    }

    #[test]
    fn first_non_empty_value_wins() {
        let records = vec![
            rec(SourceKind::Players, None, Some("Mystery Club"), None),
            rec(SourceKind::MatchHistory, Some("Chicago 3"), Some("Mystery Club"), Some("Park RIdge CC")),
            rec(SourceKind::SeriesStats, Some("Chicago 4"), Some("Mystery Club"), None),
        ];
        let plan = build_league_plan("APTA_CHICAGO", &records);
        let team = &plan.teams["Mystery Club"];
        assert_eq!(team.series.as_deref(), Some("Chicago 3"));
        // players row derived "Mystery Club" as the club before the explicit one arrived
        assert_eq!(team.club.as_deref(), Some("Mystery Club"));
        assert_eq!(team.sources.len(), 3);
        assert_eq!(plan.conflicts, 2);
    }

    #[test]
    fn empty_records_are_counted() {
        let records = vec![
            rec(SourceKind::Players, None, None, Some("Tennaqua")),
            rec(SourceKind::SeriesStats, Some("Series 2"), None, None),
        ];
        let plan = build_league_plan("CNSWPL", &records);
        assert_eq!(plan.records_empty, 1);
        assert_eq!(plan.records_used, 1);
        assert!(plan.teams.is_empty());
        assert_eq!(plan.series.len(), 1);
    }
}
