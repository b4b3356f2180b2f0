use std::fmt::Write as _;

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use sqlx::SqliteConnection;

use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct DbCountsConfig {
    /// Optional override for the database URL.
    pub database_url: Option<String>,
    /// Force the per-league breakdown (defaults to env DB_COUNTS_PER_LEAGUE, on).
    pub per_league: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeagueCounts {
    pub league_id: String,
    pub series: i64,
    pub teams: i64,
    pub teams_without_series: i64,
    pub teams_without_club: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DbCounts {
    pub leagues: i64,
    pub series: i64,
    pub series_leagues: i64,
    pub clubs: i64,
    pub teams: i64,
    pub latest_team_created: Option<DateTime<Utc>>,
    pub per_league: Vec<LeagueCounts>,
}

fn is_missing_table_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("no such table"),
        _ => false,
    }
}

fn parse_sqlite_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Gather row counts. Missing tables count as zero so the tool works against
/// partially migrated databases.
pub async fn collect(conn: &mut SqliteConnection, per_league: bool) -> Result<DbCounts> {
    macro_rules! count {
        ($sql:expr) => {
            match sqlx::query_scalar::<_, i64>($sql).fetch_one(&mut *conn).await {
                Ok(val) => val,
                Err(e) if is_missing_table_error(&e) => 0,
                Err(e) => return Err(e.into()),
            }
        };
    }

    let mut counts = DbCounts {
        leagues: count!("SELECT COUNT(*) FROM leagues"),
        series: count!("SELECT COUNT(*) FROM series"),
        series_leagues: count!("SELECT COUNT(*) FROM series_leagues"),
        clubs: count!("SELECT COUNT(*) FROM clubs"),
        teams: count!("SELECT COUNT(*) FROM teams"),
        ..Default::default()
    };

    counts.latest_team_created =
        match sqlx::query_scalar::<_, Option<String>>("SELECT MAX(created_at) FROM teams")
            .fetch_one(&mut *conn)
            .await
        {
            Ok(raw) => raw.as_deref().and_then(parse_sqlite_timestamp),
            Err(e) if is_missing_table_error(&e) => None,
            Err(e) => return Err(e.into()),
        };

    if per_league && counts.leagues > 0 {
        let rows = sqlx::query_as::<_, (String, i64, i64, i64, i64)>(
            "SELECT l.league_id,
                    (SELECT COUNT(*) FROM series_leagues sl WHERE sl.league_id = l.id),
                    (SELECT COUNT(*) FROM teams t WHERE t.league_id = l.id),
                    (SELECT COUNT(*) FROM teams t WHERE t.league_id = l.id AND t.series_id IS NULL),
                    (SELECT COUNT(*) FROM teams t WHERE t.league_id = l.id AND t.club_id IS NULL)
             FROM leagues l
             ORDER BY l.league_id",
        )
        .fetch_all(&mut *conn)
        .await?;
        counts.per_league = rows
            .into_iter()
            .map(
                |(league_id, series, teams, teams_without_series, teams_without_club)| LeagueCounts {
                    league_id,
                    series,
                    teams,
                    teams_without_series,
                    teams_without_club,
                },
            )
            .collect();
    }
    Ok(counts)
}

pub fn render(counts: &DbCounts) -> String {
    let mut out = String::new();
    writeln!(out, "leagues:          {}", counts.leagues).ok();
    writeln!(out, "series:           {}", counts.series).ok();
    writeln!(out, "series_leagues:   {}", counts.series_leagues).ok();
    writeln!(out, "clubs:            {}", counts.clubs).ok();
    writeln!(out, "teams:            {}", counts.teams).ok();
    match counts.latest_team_created {
        Some(ts) => writeln!(out, "latest team:      {}", ts.to_rfc3339()).ok(),
        None => writeln!(out, "latest team:      (none)").ok(),
    };

    if !counts.per_league.is_empty() {
        writeln!(out, "\nper league (series / teams / no series / no club):").ok();
        for row in &counts.per_league {
            writeln!(
                out,
                "  {:<14} {:>5} {:>6} {:>6} {:>6}",
                row.league_id, row.series, row.teams, row.teams_without_series, row.teams_without_club
            )
            .ok();
        }
        let empty = counts
            .per_league
            .iter()
            .filter(|r| r.teams == 0)
            .map(|r| r.league_id.as_str())
            .join(", ");
        if !empty.is_empty() {
            writeln!(out, "leagues without teams: {empty}").ok();
        }
    }
    out
}

pub async fn run(cfg: DbCountsConfig) -> Result<()> {
    env_util::init_env();
    let per_league = cfg
        .per_league
        .unwrap_or_else(|| env_util::env_flag("DB_COUNTS_PER_LEAGUE", true));
    let db = super::connect(cfg.database_url.clone(), Some(1)).await?;
    let mut conn = db.pool.acquire().await?;
    let counts = collect(&mut conn, per_league).await?;
    print!("{}", render(&counts));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::Db;

    #[tokio::test]
    async fn counts_rows_per_league() {
        let db = Db::connect_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        sqlx::raw_sql(
            "INSERT INTO leagues (id, league_id, league_name) VALUES (1, 'APTA_CHICAGO', 'APTA Chicago'), (2, 'NSTF', 'NSTF');
             INSERT INTO series (id, name, display_name) VALUES (10, 'Chicago 6', 'Chicago 6');
             INSERT INTO series_leagues (series_id, league_id) VALUES (10, 1);
             INSERT INTO teams (team_name, league_id, series_id) VALUES ('Tennaqua - 6', 1, 10);",
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let counts = collect(&mut conn, true).await.unwrap();
        assert_eq!((counts.leagues, counts.series, counts.teams), (2, 1, 1));
        assert!(counts.latest_team_created.is_some());
        assert_eq!(
            counts.per_league[0],
            LeagueCounts {
                league_id: "APTA_CHICAGO".into(),
                series: 1,
                teams: 1,
                teams_without_series: 0,
                teams_without_club: 1,
            }
        );
        let text = render(&counts);
        assert!(text.contains("leagues without teams: NSTF"));
    }

    #[test]
    fn parses_sqlite_current_timestamp() {
        let ts = parse_sqlite_timestamp("2024-09-14 18:03:11").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-09-14T18:03:11+00:00");
        assert!(parse_sqlite_timestamp("yesterday").is_none());
    }
}
