//! Per-run read-through cache of existing leagues, series, links, clubs and
//! teams. Built once by bulk pre-load, passed by `&mut` through the pipeline
//! and dropped at the end of the run; nothing persists across runs.

use anyhow::Result;
use sqlx::SqliteConnection;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// Cached view of a `teams` row: the FKs the heal-forward policy may fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamRow {
    pub id: i64,
    pub series_id: Option<i64>,
    pub club_id: Option<i64>,
}

/// Inverse of one cache mutation made while a checkpoint is open.
#[derive(Debug)]
enum Undo {
    League(String),
    Series((i64, String)),
    SeriesName(String),
    Link((i64, i64)),
    Club(String),
    Team((i64, String), Option<TeamRow>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub leagues: usize,
    pub series: usize,
    pub series_links: usize,
    pub clubs: usize,
    pub teams: usize,
}

#[derive(Debug, Default)]
pub struct ReconcileCache {
    leagues: HashMap<String, i64>,
    series: HashMap<(i64, String), i64>,
    series_by_name: HashMap<String, i64>,
    series_links: HashSet<(i64, i64)>,
    /// Keyed by ASCII-lowercased name, matching SQLite's NOCASE folding.
    /// Values hold the stored spelling and id.
    clubs: HashMap<String, (String, i64)>,
    teams: HashMap<(i64, String), TeamRow>,
    journal: Option<Vec<Undo>>,
}

impl ReconcileCache {
    /// Bulk-load every existing row the reconciler may look up.
    #[instrument(skip(conn))]
    pub async fn preload(conn: &mut SqliteConnection) -> Result<Self> {
        let mut cache = Self::default();

        for (id, code) in sqlx::query_as::<_, (i64, String)>("SELECT id, league_id FROM leagues")
            .fetch_all(&mut *conn)
            .await?
        {
            cache.leagues.insert(code, id);
        }

        for (id, name) in sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM series")
            .fetch_all(&mut *conn)
            .await?
        {
            cache.series_by_name.insert(name, id);
        }

        for (series_id, name, league_id) in sqlx::query_as::<_, (i64, String, i64)>(
            "SELECT s.id, s.name, sl.league_id
             FROM series s
             JOIN series_leagues sl ON sl.series_id = s.id",
        )
        .fetch_all(&mut *conn)
        .await?
        {
            cache.series.insert((league_id, name), series_id);
            cache.series_links.insert((series_id, league_id));
        }

        for (id, name) in sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM clubs")
            .fetch_all(&mut *conn)
            .await?
        {
            cache.clubs.insert(name.to_ascii_lowercase(), (name, id));
        }

        for (id, league_id, team_name, series_id, club_id) in
            sqlx::query_as::<_, (i64, i64, String, Option<i64>, Option<i64>)>(
                "SELECT id, league_id, team_name, series_id, club_id FROM teams",
            )
            .fetch_all(&mut *conn)
            .await?
        {
            cache.teams.insert(
                (league_id, team_name),
                TeamRow {
                    id,
                    series_id,
                    club_id,
                },
            );
        }

        debug!(stats = ?cache.stats(), "reconcile cache preloaded");
        Ok(cache)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            leagues: self.leagues.len(),
            series: self.series_by_name.len(),
            series_links: self.series_links.len(),
            clubs: self.clubs.len(),
            teams: self.teams.len(),
        }
    }

    pub fn league_codes(&self) -> impl Iterator<Item = &str> {
        self.leagues.keys().map(String::as_str)
    }

    pub fn league_id(&self, code: &str) -> Option<i64> {
        self.leagues.get(code).copied()
    }

    pub fn remember_league(&mut self, code: &str, id: i64) {
        if self.leagues.insert(code.to_string(), id).is_none() {
            self.record(Undo::League(code.to_string()));
        }
    }

    pub fn series_in_league(&self, league_id: i64, name: &str) -> Option<i64> {
        self.series.get(&(league_id, name.to_string())).copied()
    }

    pub fn series_named(&self, name: &str) -> Option<i64> {
        self.series_by_name.get(name).copied()
    }

    /// Record a series row by name only (not yet known to be linked).
    pub fn remember_series_name(&mut self, name: &str, id: i64) {
        if self.series_by_name.insert(name.to_string(), id).is_none() {
            self.record(Undo::SeriesName(name.to_string()));
        }
    }

    /// Record a series linked into `league_id`.
    pub fn remember_series(&mut self, league_id: i64, name: &str, id: i64) {
        self.remember_series_name(name, id);
        let key = (league_id, name.to_string());
        if self.series.insert(key.clone(), id).is_none() {
            self.record(Undo::Series(key));
        }
        self.remember_link(id, league_id);
    }

    pub fn has_link(&self, series_id: i64, league_id: i64) -> bool {
        self.series_links.contains(&(series_id, league_id))
    }

    pub fn remember_link(&mut self, series_id: i64, league_id: i64) {
        if self.series_links.insert((series_id, league_id)) {
            self.record(Undo::Link((series_id, league_id)));
        }
    }

    /// Club names match regardless of case, like the `clubs.name` column.
    pub fn club(&self, name: &str) -> Option<i64> {
        self.clubs.get(&name.to_ascii_lowercase()).map(|(_, id)| *id)
    }

    /// Stored spellings of every known club.
    pub fn club_names(&self) -> impl Iterator<Item = &str> {
        self.clubs.values().map(|(name, _)| name.as_str())
    }

    pub fn remember_club(&mut self, name: &str, id: i64) {
        let key = name.to_ascii_lowercase();
        if !self.clubs.contains_key(&key) {
            self.clubs.insert(key.clone(), (name.to_string(), id));
            self.record(Undo::Club(key));
        }
    }

    pub fn team(&self, league_id: i64, team_name: &str) -> Option<TeamRow> {
        self.teams.get(&(league_id, team_name.to_string())).copied()
    }

    pub fn remember_team(&mut self, league_id: i64, team_name: &str, row: TeamRow) {
        let key = (league_id, team_name.to_string());
        let previous = self.teams.insert(key.clone(), row);
        if previous != Some(row) {
            self.record(Undo::Team(key, previous));
        }
    }

    fn record(&mut self, undo: Undo) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(undo);
        }
    }

    /// Start journaling mutations so they can be discarded with [`rollback`](Self::rollback).
    /// Checkpoints do not nest; opening one discards an unfinished journal.
    pub fn checkpoint(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keep every mutation made since the checkpoint.
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo every mutation made since the checkpoint, newest first.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::League(code) => {
                    self.leagues.remove(&code);
                }
                Undo::Series(key) => {
                    self.series.remove(&key);
                }
                Undo::SeriesName(name) => {
                    self.series_by_name.remove(&name);
                }
                Undo::Link(key) => {
                    self.series_links.remove(&key);
                }
                Undo::Club(name) => {
                    self.clubs.remove(&name);
                }
                Undo::Team(key, Some(previous)) => {
                    self.teams.insert(key, previous);
                }
                Undo::Team(key, None) => {
                    self.teams.remove(&key);
                }
            }
        }
    }
}
