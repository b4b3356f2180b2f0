//! Source loader: reads the scraper's JSON output for one league.
//!
//! Layout under the data root:
//!   `<root>/<LEAGUE>/players.json`, `match_history.json`, `series_stats.json`
//!   `<root>/all/players.json`, `<root>/all/match_history.json` (every league, filtered here)
//!
//! A missing or malformed file never aborts loading; it is reported in the
//! returned counters and the remaining files are still read.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::normalization::normalize_league_id;

/// Directory holding the consolidated multi-league files.
pub const CONSOLIDATED_DIR: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Players,
    MatchHistory,
    SeriesStats,
}

impl SourceKind {
    /// Load order. Earlier sources win when records disagree.
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Players,
        SourceKind::MatchHistory,
        SourceKind::SeriesStats,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            SourceKind::Players => "players.json",
            SourceKind::MatchHistory => "match_history.json",
            SourceKind::SeriesStats => "series_stats.json",
        }
    }

    /// Whether a consolidated copy exists under [`CONSOLIDATED_DIR`].
    pub fn has_consolidated(self) -> bool {
        !matches!(self, SourceKind::SeriesStats)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Players => "players",
            SourceKind::MatchHistory => "match_history",
            SourceKind::SeriesStats => "series_stats",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flat record as found in a source file. Values are raw (not normalized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub kind: SourceKind,
    pub league: Option<String>,
    pub series: Option<String>,
    pub team: Option<String>,
    pub club: Option<String>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file missing: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: expected a JSON array of records", path.display())]
    NotAnArray { path: PathBuf },
}

impl SourceError {
    pub fn is_missing(&self) -> bool {
        matches!(self, SourceError::Missing(_))
    }
}

/// Records parsed from one file plus rows that were not JSON objects.
#[derive(Debug, Default)]
pub struct FileLoad {
    pub records: Vec<SourceRecord>,
    pub rows_skipped: usize,
}

const LEAGUE_KEYS: &[&str] = &["League", "league", "league_id"];
const SERIES_KEYS: &[&str] = &["Series", "series"];
const CLUB_KEYS: &[&str] = &["Club", "club"];
const PLAYER_TEAM_KEYS: &[&str] = &["Series Mapping ID", "Team", "team", "team_name"];
const STATS_TEAM_KEYS: &[&str] = &["team", "Team", "team_name"];
const HOME_TEAM_KEYS: &[&str] = &["Home Team", "home_team"];
const AWAY_TEAM_KEYS: &[&str] = &["Away Team", "away_team"];

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        let text = match obj.get(*k)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

/// Flatten one JSON row into zero or more records. Match rows yield one
/// record per side.
fn row_records(kind: SourceKind, obj: &Map<String, Value>) -> Vec<SourceRecord> {
    let league = str_field(obj, LEAGUE_KEYS);
    let series = str_field(obj, SERIES_KEYS);
    match kind {
        SourceKind::Players => vec![SourceRecord {
            kind,
            league,
            series,
            team: str_field(obj, PLAYER_TEAM_KEYS),
            club: str_field(obj, CLUB_KEYS),
        }],
        SourceKind::MatchHistory => [HOME_TEAM_KEYS, AWAY_TEAM_KEYS]
            .iter()
            .filter_map(|keys| str_field(obj, keys))
            .map(|team| SourceRecord {
                kind,
                league: league.clone(),
                series: series.clone(),
                team: Some(team),
                club: None,
            })
            .collect(),
        SourceKind::SeriesStats => vec![SourceRecord {
            kind,
            league,
            series,
            team: str_field(obj, STATS_TEAM_KEYS),
            club: str_field(obj, CLUB_KEYS),
        }],
    }
}

/// Parse an already-decoded document. `None` when the top level is not an array.
pub fn parse_records(kind: SourceKind, doc: &Value) -> Option<FileLoad> {
    let rows = doc.as_array()?;
    let mut load = FileLoad::default();
    for row in rows {
        match row.as_object() {
            Some(obj) => load.records.extend(row_records(kind, obj)),
            None => load.rows_skipped += 1,
        }
    }
    Some(load)
}

pub fn load_source_file(path: &Path, kind: SourceKind) -> Result<FileLoad, SourceError> {
    if !path.is_file() {
        return Err(SourceError::Missing(path.to_path_buf()));
    }
    let raw = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_slice(&raw).map_err(|source| SourceError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(kind, &doc).ok_or_else(|| SourceError::NotAnArray {
        path: path.to_path_buf(),
    })
}

/// Per-file outcome counters for a group of source files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileCounts {
    pub files_read: usize,
    pub files_missing: usize,
    pub files_malformed: usize,
    pub rows_skipped: usize,
}

impl FileCounts {
    /// Load `path`, counting the outcome. Unreadable files yield no records.
    fn load(&mut self, path: &Path, kind: SourceKind, scope: &str) -> Vec<SourceRecord> {
        match load_source_file(path, kind) {
            Ok(load) => {
                self.files_read += 1;
                self.rows_skipped += load.rows_skipped;
                debug!(scope, source = %kind, path = %path.display(), records = load.records.len(), "source file loaded");
                load.records
            }
            Err(err) if err.is_missing() => {
                self.files_missing += 1;
                info!(scope, source = %kind, path = %path.display(), "source file missing; contributes no records");
                Vec::new()
            }
            Err(err) => {
                self.files_malformed += 1;
                warn!(scope, source = %kind, error = %err, "skipping unreadable source file");
                Vec::new()
            }
        }
    }
}

/// The multi-league files under [`CONSOLIDATED_DIR`], read once per run and
/// shared by every league.
#[derive(Debug, Default)]
pub struct ConsolidatedSources {
    pub records: Vec<SourceRecord>,
    pub counts: FileCounts,
}

impl ConsolidatedSources {
    pub fn load(root: &Path) -> Self {
        let mut out = Self::default();
        for kind in SourceKind::ALL.into_iter().filter(|k| k.has_consolidated()) {
            let path = root.join(CONSOLIDATED_DIR).join(kind.file_name());
            let records = out.counts.load(&path, kind, CONSOLIDATED_DIR);
            out.records.extend(records);
        }
        out
    }

    /// Normalized league codes named by any consolidated record.
    pub fn league_codes(&self) -> impl Iterator<Item = String> + '_ {
        self.records
            .iter()
            .filter_map(|r| r.league.as_deref())
            .map(normalize_league_id)
            .filter(|code| !code.is_empty())
    }
}

/// Everything loaded for one league. `counts` covers the per-league files
/// only; the consolidated files are counted once on [`ConsolidatedSources`].
#[derive(Debug, Default)]
pub struct LeagueSources {
    pub league: String,
    pub records: Vec<SourceRecord>,
    pub counts: FileCounts,
    /// Consolidated rows that belong to another league or carry no league.
    pub rows_filtered: usize,
}

impl LeagueSources {
    pub fn count(&self, kind: SourceKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }
}

fn is_consolidated_dir(name: &str) -> bool {
    name.eq_ignore_ascii_case(CONSOLIDATED_DIR)
}

fn subdirectories(root: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut dirs: Vec<(String, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?.to_string();
            Some((name, p))
        })
        .collect();
    dirs.sort();
    dirs
}

/// Per-league directories whose name normalizes to `league_code`. Falls back
/// to `<root>/<code>` so a missing directory is reported as missing files.
fn league_dirs(root: &Path, league_code: &str) -> Vec<PathBuf> {
    let dirs: Vec<PathBuf> = subdirectories(root)
        .into_iter()
        .filter(|(name, _)| !is_consolidated_dir(name) && normalize_league_id(name) == league_code)
        .map(|(_, path)| path)
        .collect();
    if dirs.is_empty() {
        vec![root.join(league_code)]
    } else {
        dirs
    }
}

/// League codes implied by the per-league directory names, normalized and sorted.
pub fn discover_leagues(root: &Path) -> Vec<String> {
    let mut codes: Vec<String> = subdirectories(root)
        .into_iter()
        .filter(|(name, _)| !is_consolidated_dir(name))
        .map(|(name, _)| normalize_league_id(&name))
        .filter(|code| !code.is_empty())
        .collect();
    codes.sort();
    codes.dedup();
    codes
}

/// Load every source for `league_code` (already normalized): for each kind
/// in [`SourceKind::ALL`] order, the per-league files first, then the
/// consolidated records that name this league.
pub fn load_league_sources(
    root: &Path,
    league_code: &str,
    consolidated: &ConsolidatedSources,
) -> LeagueSources {
    let mut out = LeagueSources {
        league: league_code.to_string(),
        ..Default::default()
    };
    let dirs = league_dirs(root, league_code);

    for kind in SourceKind::ALL {
        for dir in &dirs {
            // Rows without a league inside a league's own directory belong to it.
            for record in out.counts.load(&dir.join(kind.file_name()), kind, league_code) {
                let keep = record
                    .league
                    .as_deref()
                    .map_or(true, |raw| normalize_league_id(raw) == league_code);
                if keep {
                    out.records.push(record);
                } else {
                    out.rows_filtered += 1;
                }
            }
        }

        for record in consolidated.records.iter().filter(|r| r.kind == kind) {
            let keep = record
                .league
                .as_deref()
                .is_some_and(|raw| normalize_league_id(raw) == league_code);
            if keep {
                out.records.push(record.clone());
            } else {
                out.rows_filtered += 1;
            }
        }
    }
    out
}
