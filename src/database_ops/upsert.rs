//! Idempotent find-or-create operations for the league schema.
//!
//! Every `ensure_*` looks the natural key up in the run cache, then in the
//! database, and only inserts when both miss, so calling one twice with the
//! same input never creates a second row. Existing rows are only ever
//! touched to fill NULL foreign keys (COALESCE), never to overwrite.
//!
//! Dependency order for callers: league lookup -> series -> series_leagues
//! link -> club -> team.

use anyhow::{Context, Result};
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use super::cache::{ReconcileCache, TeamRow};
use super::schema::SchemaProfile;
use crate::normalization::{league::KNOWN_LEAGUES, similar_club};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Row already existed and nothing changed.
    Existing,
    Created,
    /// Row existed and NULL fields were filled.
    Healed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ensured {
    pub id: i64,
    pub outcome: Outcome,
}

impl Ensured {
    fn existing(id: i64) -> Self {
        Self {
            id,
            outcome: Outcome::Existing,
        }
    }

    fn created(id: i64) -> Self {
        Self {
            id,
            outcome: Outcome::Created,
        }
    }
}

/// Helper enum for dynamic parameter binding
#[derive(Debug)]
enum ParamValue<'a> {
    Str(&'a str),
    Int(i64),
    OptInt(Option<i64>),
    Bool(bool),
}

/// Run a dynamic `INSERT` and return the new rowid.
async fn insert_row(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[&str],
    params: Vec<ParamValue<'_>>,
) -> Result<i64> {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );
    let mut q = sqlx::query(&sql);
    for p in params {
        q = match p {
            ParamValue::Str(s) => q.bind(s),
            ParamValue::Int(i) => q.bind(i),
            ParamValue::OptInt(i) => q.bind(i),
            ParamValue::Bool(b) => q.bind(b),
        };
    }
    Ok(q.execute(&mut *conn).await?.last_insert_rowid())
}

/// Resolve a canonical league code to `leagues.id`. Leagues are never created here.
pub async fn lookup_league(
    conn: &mut SqliteConnection,
    cache: &mut ReconcileCache,
    league_code: &str,
) -> Result<Option<i64>> {
    if let Some(id) = cache.league_id(league_code) {
        return Ok(Some(id));
    }
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM leagues WHERE league_id = ?1")
        .bind(league_code)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = id {
        cache.remember_league(league_code, id);
    }
    Ok(id)
}

/// Find or create the series `name` for `league_id`.
///
/// Lookup is scoped by league first (through `series_leagues`); a series of
/// the same name that exists only in other leagues is reused, not duplicated.
/// The caller links it with [`ensure_series_league`].
pub async fn ensure_series(
    conn: &mut SqliteConnection,
    cache: &mut ReconcileCache,
    schema: &SchemaProfile,
    league_id: i64,
    name: &str,
) -> Result<Ensured> {
    if let Some(id) = cache.series_in_league(league_id, name) {
        return Ok(Ensured::existing(id));
    }
    if let Some(id) = cache.series_named(name) {
        if cache.has_link(id, league_id) {
            cache.remember_series(league_id, name, id);
        }
        return Ok(Ensured::existing(id));
    }

    let scoped: Option<i64> = sqlx::query_scalar(
        "SELECT s.id FROM series s
         JOIN series_leagues sl ON sl.series_id = s.id
         WHERE s.name = ?1 AND sl.league_id = ?2
         LIMIT 1",
    )
    .bind(name)
    .bind(league_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = scoped {
        cache.remember_series(league_id, name, id);
        return Ok(Ensured::existing(id));
    }

    let global: Option<i64> = sqlx::query_scalar("SELECT id FROM series WHERE name = ?1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = global {
        cache.remember_series_name(name, id);
        return Ok(Ensured::existing(id));
    }

    let mut columns = vec!["name"];
    let mut params = vec![ParamValue::Str(name)];
    // Some schemas declare display_name NOT NULL; always supply it when the column exists.
    if schema.series_display_name.exists() {
        columns.push("display_name");
        params.push(ParamValue::Str(name));
    }
    if schema.series_league_id.exists() {
        columns.push("league_id");
        params.push(ParamValue::Int(league_id));
    }
    let id = insert_row(conn, "series", &columns, params)
        .await
        .with_context(|| format!("insert series '{name}'"))?;
    cache.remember_series_name(name, id);
    info!(series = %name, id, "created series");
    Ok(Ensured::created(id))
}

/// Ensure the `(series_id, league_id)` join row exists.
pub async fn ensure_series_league(
    conn: &mut SqliteConnection,
    cache: &mut ReconcileCache,
    schema: &SchemaProfile,
    series_id: i64,
    league_id: i64,
) -> Result<Outcome> {
    if cache.has_link(series_id, league_id) {
        return Ok(Outcome::Existing);
    }
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM series_leagues WHERE series_id = ?1 AND league_id = ?2",
    )
    .bind(series_id)
    .bind(league_id)
    .fetch_optional(&mut *conn)
    .await?;

    let outcome = if exists.is_some() {
        Outcome::Existing
    } else {
        insert_row(
            conn,
            "series_leagues",
            &["series_id", "league_id"],
            vec![ParamValue::Int(series_id), ParamValue::Int(league_id)],
        )
        .await
        .with_context(|| format!("link series {series_id} to league {league_id}"))?;
        debug!(series_id, league_id, "linked series to league");
        Outcome::Created
    };

    // Legacy direct FK: fill it once, never repoint it.
    if schema.series_league_id.exists() {
        sqlx::query("UPDATE series SET league_id = COALESCE(league_id, ?1) WHERE id = ?2")
            .bind(league_id)
            .bind(series_id)
            .execute(&mut *conn)
            .await?;
    }
    cache.remember_link(series_id, league_id);
    Ok(outcome)
}

/// Find or create a club by its canonical name. Clubs are global and names
/// match case-insensitively; the first spelling stored is kept.
pub async fn ensure_club(
    conn: &mut SqliteConnection,
    cache: &mut ReconcileCache,
    name: &str,
) -> Result<Ensured> {
    if let Some(id) = cache.club(name) {
        return Ok(Ensured::existing(id));
    }
    let found: Option<(i64, String)> =
        sqlx::query_as("SELECT id, name FROM clubs WHERE name = ?1 COLLATE NOCASE")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some((id, stored)) = found {
        cache.remember_club(&stored, id);
        return Ok(Ensured::existing(id));
    }

    if let Some((near, score)) = similar_club(name, cache.club_names()) {
        warn!(club = %name, similar_to = %near, score, "creating club that looks like an existing one");
    }
    let id = insert_row(conn, "clubs", &["name"], vec![ParamValue::Str(name)])
        .await
        .with_context(|| format!("insert club '{name}'"))?;
    cache.remember_club(name, id);
    info!(club = %name, id, "created club");
    Ok(Ensured::created(id))
}

/// Natural key plus the foreign keys known for a team in this run.
#[derive(Debug, Clone, Copy)]
pub struct TeamSpec<'a> {
    pub league_id: i64,
    pub team_name: &'a str,
    pub series_id: Option<i64>,
    pub club_id: Option<i64>,
}

/// Find or create the team `(team_name, league_id)`. An existing team gets
/// its NULL `series_id`/`club_id` filled from `spec`; set values are kept.
pub async fn ensure_team(
    conn: &mut SqliteConnection,
    cache: &mut ReconcileCache,
    schema: &SchemaProfile,
    spec: TeamSpec<'_>,
) -> Result<Ensured> {
    let existing = match cache.team(spec.league_id, spec.team_name) {
        Some(row) => Some(row),
        None => sqlx::query_as::<_, (i64, Option<i64>, Option<i64>)>(
            "SELECT id, series_id, club_id FROM teams WHERE team_name = ?1 AND league_id = ?2",
        )
        .bind(spec.team_name)
        .bind(spec.league_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|(id, series_id, club_id)| TeamRow {
            id,
            series_id,
            club_id,
        }),
    };

    if let Some(row) = existing {
        let fill_series = row.series_id.is_none() && spec.series_id.is_some();
        let fill_club = row.club_id.is_none() && spec.club_id.is_some();
        if !fill_series && !fill_club {
            cache.remember_team(spec.league_id, spec.team_name, row);
            return Ok(Ensured::existing(row.id));
        }

        let touch = if schema.teams_updated_at.exists() {
            ", updated_at = CURRENT_TIMESTAMP"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE teams SET series_id = COALESCE(series_id, ?1), club_id = COALESCE(club_id, ?2){touch} WHERE id = ?3"
        );
        sqlx::query(&sql)
            .bind(spec.series_id)
            .bind(spec.club_id)
            .bind(row.id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("heal team '{}'", spec.team_name))?;
        let healed = TeamRow {
            id: row.id,
            series_id: row.series_id.or(spec.series_id),
            club_id: row.club_id.or(spec.club_id),
        };
        cache.remember_team(spec.league_id, spec.team_name, healed);
        info!(team = %spec.team_name, id = row.id, fill_series, fill_club, "healed team foreign keys");
        return Ok(Ensured {
            id: row.id,
            outcome: Outcome::Healed,
        });
    }

    let mut columns = vec!["team_name", "league_id", "series_id", "club_id"];
    let mut params = vec![
        ParamValue::Str(spec.team_name),
        ParamValue::Int(spec.league_id),
        ParamValue::OptInt(spec.series_id),
        ParamValue::OptInt(spec.club_id),
    ];
    if schema.teams_display_name.exists() {
        columns.push("display_name");
        params.push(ParamValue::Str(spec.team_name));
    }
    if schema.teams_is_active.exists() {
        columns.push("is_active");
        params.push(ParamValue::Bool(true));
    }
    let id = insert_row(conn, "teams", &columns, params)
        .await
        .with_context(|| format!("insert team '{}'", spec.team_name))?;
    cache.remember_team(
        spec.league_id,
        spec.team_name,
        TeamRow {
            id,
            series_id: spec.series_id,
            club_id: spec.club_id,
        },
    );
    info!(team = %spec.team_name, id, "created team");
    Ok(Ensured::created(id))
}

/// Insert the known league rows that are missing. Admin-only: the bootstrap
/// itself treats leagues as a precondition.
pub async fn seed_known_leagues(conn: &mut SqliteConnection) -> Result<usize> {
    let mut inserted = 0usize;
    for (code, name) in KNOWN_LEAGUES {
        let res = sqlx::query("INSERT OR IGNORE INTO leagues (league_id, league_name) VALUES (?1, ?2)")
            .bind(*code)
            .bind(*name)
            .execute(&mut *conn)
            .await?;
        inserted += res.rows_affected() as usize;
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::Db;

    async fn setup() -> (Db, SchemaProfile) {
        let db = Db::connect_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        seed_known_leagues(&mut conn).await.unwrap();
        let schema = SchemaProfile::detect(&mut conn).await.unwrap();
        drop(conn);
        (db, schema)
    }

    async fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut *conn)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn ensure_calls_are_idempotent() {
        let (db, schema) = setup().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut cache = ReconcileCache::preload(&mut conn).await.unwrap();
        let league = lookup_league(&mut conn, &mut cache, "APTA_CHICAGO")
            .await
            .unwrap()
            .unwrap();

        for round in 0..2 {
            let series = ensure_series(&mut conn, &mut cache, &schema, league, "Chicago 6")
                .await
                .unwrap();
            ensure_series_league(&mut conn, &mut cache, &schema, series.id, league)
                .await
                .unwrap();
            let club = ensure_club(&mut conn, &mut cache, "Tennaqua").await.unwrap();
            let team = ensure_team(
                &mut conn,
                &mut cache,
                &schema,
                TeamSpec {
                    league_id: league,
                    team_name: "Tennaqua - 6",
                    series_id: Some(series.id),
                    club_id: Some(club.id),
                },
            )
            .await
            .unwrap();
            let expected = if round == 0 { Outcome::Created } else { Outcome::Existing };
            assert_eq!(team.outcome, expected);
        }

        // A fresh cache must find the same rows through the database.
        let mut cold = ReconcileCache::default();
        let again = ensure_club(&mut conn, &mut cold, "Tennaqua").await.unwrap();
        assert_eq!(again.outcome, Outcome::Existing);

        assert_eq!(count(&mut conn, "series").await, 1);
        assert_eq!(count(&mut conn, "series_leagues").await, 1);
        assert_eq!(count(&mut conn, "clubs").await, 1);
        assert_eq!(count(&mut conn, "teams").await, 1);
    }

    #[tokio::test]
    async fn club_lookup_ignores_case() {
        let (db, _) = setup().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut cache = ReconcileCache::default();

        let first = ensure_club(&mut conn, &mut cache, "Tennaqua").await.unwrap();
        let warm = ensure_club(&mut conn, &mut cache, "TENNAQUA").await.unwrap();
        assert_eq!(first.outcome, Outcome::Created);
        assert_eq!((warm.outcome, warm.id), (Outcome::Existing, first.id));

        let mut cold = ReconcileCache::default();
        let cold_hit = ensure_club(&mut conn, &mut cold, "tennaqua").await.unwrap();
        assert_eq!((cold_hit.outcome, cold_hit.id), (Outcome::Existing, first.id));
        assert_eq!(cold.club_names().collect::<Vec<_>>(), ["Tennaqua"]);

        // The column itself rejects a case-only duplicate.
        assert!(sqlx::query("INSERT INTO clubs (name) VALUES ('TENNAQUA')")
            .execute(&mut *conn)
            .await
            .is_err());
        assert_eq!(count(&mut conn, "clubs").await, 1);
    }

    #[tokio::test]
    async fn series_is_shared_across_leagues() {
        let (db, schema) = setup().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut cache = ReconcileCache::default();
        let nstf = lookup_league(&mut conn, &mut cache, "NSTF").await.unwrap().unwrap();
        let cnswpl = lookup_league(&mut conn, &mut cache, "CNSWPL").await.unwrap().unwrap();

        let a = ensure_series(&mut conn, &mut cache, &schema, nstf, "Series 1").await.unwrap();
        ensure_series_league(&mut conn, &mut cache, &schema, a.id, nstf).await.unwrap();
        let b = ensure_series(&mut conn, &mut cache, &schema, cnswpl, "Series 1").await.unwrap();
        let link = ensure_series_league(&mut conn, &mut cache, &schema, b.id, cnswpl)
            .await
            .unwrap();

        assert_eq!(a.outcome, Outcome::Created);
        assert_eq!((b.id, b.outcome), (a.id, Outcome::Existing));
        assert_eq!(link, Outcome::Created);
        assert_eq!(cache.series_in_league(cnswpl, "Series 1"), None);
        let again = ensure_series(&mut conn, &mut cache, &schema, cnswpl, "Series 1").await.unwrap();
        assert_eq!(again.id, a.id);
        assert_eq!(cache.series_in_league(cnswpl, "Series 1"), Some(a.id));
        assert_eq!(count(&mut conn, "series_leagues").await, 2);
    }

    #[tokio::test]
    async fn heals_null_fks_without_overwriting() {
        let (db, schema) = setup().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut cache = ReconcileCache::default();
        let league = lookup_league(&mut conn, &mut cache, "CNSWPL").await.unwrap().unwrap();
        let club = ensure_club(&mut conn, &mut cache, "Tennaqua").await.unwrap().id;
        let other = ensure_club(&mut conn, &mut cache, "Wilmette").await.unwrap().id;

        let spec = |club_id| TeamSpec {
            league_id: league,
            team_name: "Tennaqua 12",
            series_id: None,
            club_id,
        };
        let created = ensure_team(&mut conn, &mut cache, &schema, spec(None)).await.unwrap();
        let healed = ensure_team(&mut conn, &mut cache, &schema, spec(Some(club))).await.unwrap();
        assert_eq!(healed, Ensured { id: created.id, outcome: Outcome::Healed });

        // Neither a different club nor a missing one may replace the stored value.
        for attempt in [Some(other), None] {
            let r = ensure_team(&mut conn, &mut cache, &schema, spec(attempt)).await.unwrap();
            assert_eq!(r.outcome, Outcome::Existing);
        }
        let stored: Option<i64> = sqlx::query_scalar("SELECT club_id FROM teams WHERE id = ?1")
            .bind(created.id)
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(stored, Some(club));
    }

    #[tokio::test]
    async fn unknown_leagues_are_not_created() {
        let (db, _) = setup().await;
        let mut conn = db.pool.acquire().await.unwrap();
        let mut cache = ReconcileCache::default();
        assert_eq!(lookup_league(&mut conn, &mut cache, "PTL_DENVER").await.unwrap(), None);
        assert_eq!(count(&mut conn, "leagues").await, KNOWN_LEAGUES.len() as i64);
        assert_eq!(seed_known_leagues(&mut conn).await.unwrap(), 0);
    }
}
