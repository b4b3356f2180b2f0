//! Bootstrap pipeline: Loader -> Normalizer/Reconciler -> Upsert -> Validator,
//! run per league over a single connection.
//!
//! Per-record failures are logged and counted, never propagated; the run
//! only aborts when the database itself is unusable. Re-running is the
//! recovery path, which is safe because every write is an idempotent upsert.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::database_ops::cache::ReconcileCache;
use crate::database_ops::db::Db;
use crate::database_ops::reconcile::{build_league_plan, TeamCandidate};
use crate::database_ops::schema::{require_core_tables, SchemaProfile};
use crate::database_ops::upsert::{
    ensure_club, ensure_series, ensure_series_league, ensure_team, lookup_league, Ensured,
    Outcome, TeamSpec,
};
use crate::database_ops::validate::{validate, ValidationReport};
use crate::normalization::normalize_league_id;
use crate::sources::{discover_leagues, load_league_sources, ConsolidatedSources, FileCounts};
use crate::util::env::{env_flag, env_opt};

pub const DEFAULT_DATA_DIR: &str = "data/leagues";

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Root holding `<LEAGUE>/` and `all/` source directories.
    pub data_dir: PathBuf,
    /// Restrict the run to one league; `None` processes every known league.
    pub league: Option<String>,
    /// When false, only series/links/clubs are ensured and teams are left
    /// to the dedicated team importer.
    pub create_teams: bool,
    /// Run everything inside a transaction that is rolled back at the end.
    pub dry_run: bool,
    /// Treat validation issues as failure. On by default: a run exits 0 only
    /// when it finished with no errors and no validation issues. Turn it off
    /// (`--warn-only` or `RALLY_STRICT=0`) to report issues without failing.
    pub strict: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            league: None,
            create_teams: true,
            dry_run: false,
            strict: true,
        }
    }
}

impl BootstrapConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: env_opt("RALLY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            league: env_opt("RALLY_LEAGUE"),
            create_teams: env_flag("RALLY_CREATE_TEAMS", defaults.create_teams),
            dry_run: env_flag("RALLY_DRY_RUN", defaults.dry_run),
            strict: env_flag("RALLY_STRICT", defaults.strict),
        }
    }
}

/// Error taxonomy used for counters and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SourceMissing,
    SourceMalformed,
    LeagueNotFound,
    EntityCreateFailure,
    ValidationIssue,
}

impl IssueKind {
    pub const ALL: [IssueKind; 5] = [
        IssueKind::SourceMissing,
        IssueKind::SourceMalformed,
        IssueKind::LeagueNotFound,
        IssueKind::EntityCreateFailure,
        IssueKind::ValidationIssue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::SourceMissing => "source_missing",
            IssueKind::SourceMalformed => "source_malformed",
            IssueKind::LeagueNotFound => "league_not_found",
            IssueKind::EntityCreateFailure => "entity_create_failure",
            IssueKind::ValidationIssue => "validation_issue",
        }
    }

    /// Whether an occurrence counts against the run's success.
    pub fn is_error(self) -> bool {
        !matches!(self, IssueKind::SourceMissing | IssueKind::ValidationIssue)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LeagueSummary {
    pub league: String,
    pub records_loaded: usize,
    pub files_read: usize,
    pub sources_missing: usize,
    pub sources_malformed: usize,
    pub rows_skipped: usize,
    pub league_not_found: usize,
    pub conflicts: usize,
    pub series_created: usize,
    pub series_existing: usize,
    pub series_links_created: usize,
    pub clubs_created: usize,
    pub clubs_existing: usize,
    pub teams_created: usize,
    pub teams_existing: usize,
    pub teams_healed: usize,
    pub teams_deferred: usize,
    pub teams_without_series: usize,
    pub create_failures: usize,
    /// Names of entities whose upsert failed, prefixed with the entity type.
    pub failed: Vec<String>,
}

impl LeagueSummary {
    fn new(league: &str) -> Self {
        Self {
            league: league.to_string(),
            ..Default::default()
        }
    }

    fn record_series(&mut self, ensured: Ensured, link: Outcome) {
        match ensured.outcome {
            Outcome::Created => self.series_created += 1,
            Outcome::Existing | Outcome::Healed => self.series_existing += 1,
        }
        if link == Outcome::Created {
            self.series_links_created += 1;
        }
    }

    fn record_club(&mut self, ensured: Ensured) {
        match ensured.outcome {
            Outcome::Created => self.clubs_created += 1,
            Outcome::Existing | Outcome::Healed => self.clubs_existing += 1,
        }
    }

    fn record_team(&mut self, ensured: Ensured) {
        match ensured.outcome {
            Outcome::Created => self.teams_created += 1,
            Outcome::Existing => self.teams_existing += 1,
            Outcome::Healed => self.teams_healed += 1,
        }
    }

    fn record_failure(&mut self, entity: &str, name: &str, err: &anyhow::Error) {
        warn!(
            league = %self.league,
            kind = IssueKind::EntityCreateFailure.as_str(),
            entity,
            name,
            error = %format!("{err:#}"),
            "upsert failed; continuing with next record"
        );
        self.create_failures += 1;
        self.failed.push(format!("{entity}:{name}"));
    }

    fn record_files(&mut self, counts: &FileCounts) {
        self.files_read += counts.files_read;
        self.sources_missing += counts.files_missing;
        self.sources_malformed += counts.files_malformed;
        self.rows_skipped += counts.rows_skipped;
    }

    /// Occurrences of `kind` in this summary. Validation issues are run-wide
    /// and live on [`BootstrapSummary::validation`].
    pub fn issue_count(&self, kind: IssueKind) -> usize {
        match kind {
            IssueKind::SourceMissing => self.sources_missing,
            IssueKind::SourceMalformed => self.sources_malformed,
            IssueKind::LeagueNotFound => self.league_not_found,
            IssueKind::EntityCreateFailure => self.create_failures,
            IssueKind::ValidationIssue => 0,
        }
    }

    pub fn error_count(&self) -> usize {
        IssueKind::ALL
            .into_iter()
            .filter(|kind| kind.is_error())
            .map(|kind| self.issue_count(kind))
            .sum()
    }

    fn absorb(&mut self, other: &LeagueSummary) {
        self.records_loaded += other.records_loaded;
        self.files_read += other.files_read;
        self.sources_missing += other.sources_missing;
        self.sources_malformed += other.sources_malformed;
        self.rows_skipped += other.rows_skipped;
        self.league_not_found += other.league_not_found;
        self.conflicts += other.conflicts;
        self.series_created += other.series_created;
        self.series_existing += other.series_existing;
        self.series_links_created += other.series_links_created;
        self.clubs_created += other.clubs_created;
        self.clubs_existing += other.clubs_existing;
        self.teams_created += other.teams_created;
        self.teams_existing += other.teams_existing;
        self.teams_healed += other.teams_healed;
        self.teams_deferred += other.teams_deferred;
        self.teams_without_series += other.teams_without_series;
        self.create_failures += other.create_failures;
        self.failed.extend(other.failed.iter().cloned());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub strict: bool,
    /// Counters for the consolidated `all/` files, read once per run.
    pub consolidated: FileCounts,
    pub leagues: Vec<LeagueSummary>,
    pub validation: ValidationReport,
}

impl BootstrapSummary {
    pub fn totals(&self) -> LeagueSummary {
        let mut total = LeagueSummary::new("TOTAL");
        total.record_files(&self.consolidated);
        for league in &self.leagues {
            total.absorb(league);
        }
        total
    }

    pub fn error_count(&self) -> usize {
        self.totals().error_count()
    }

    pub fn validation_issues(&self) -> i64 {
        self.validation.total_issues()
    }

    /// Zero errors, and (in strict mode) zero validation issues.
    pub fn is_success(&self) -> bool {
        self.error_count() == 0 && (!self.strict || self.validation.is_clean())
    }
}

fn summary_row(f: &mut fmt::Formatter<'_>, s: &LeagueSummary) -> fmt::Result {
    writeln!(
        f,
        "{:<14} {:>7} {:>5}/{:<5} {:>5} {:>5}/{:<5} {:>5}/{:<5}/{:<5} {:>6} {:>6}",
        s.league,
        s.records_loaded,
        s.series_created,
        s.series_existing,
        s.series_links_created,
        s.clubs_created,
        s.clubs_existing,
        s.teams_created,
        s.teams_existing,
        s.teams_healed,
        s.teams_deferred,
        s.error_count(),
    )
}

impl fmt::Display for BootstrapSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        writeln!(
            f,
            "=== bootstrap summary (run {}{}) ===",
            self.run_id,
            if self.dry_run { ", dry-run: rolled back" } else { "" }
        )?;
        writeln!(
            f,
            "{:<14} {:>7} {:>11} {:>5} {:>11} {:>17} {:>6} {:>6}",
            "league", "records", "series n/e", "links", "clubs n/e", "teams n/e/healed", "defer", "errors"
        )?;
        for league in &self.leagues {
            summary_row(f, league)?;
        }
        let totals = self.totals();
        summary_row(f, &totals)?;
        writeln!(
            f,
            "sources: {} read, {} missing, {} malformed; {} rows skipped; {} records in unknown leagues; {} conflicts",
            totals.files_read,
            totals.sources_missing,
            totals.sources_malformed,
            totals.rows_skipped,
            totals.league_not_found,
            totals.conflicts,
        )?;
        if totals.teams_without_series > 0 {
            writeln!(f, "teams without a known series: {}", totals.teams_without_series)?;
        }
        for name in &totals.failed {
            writeln!(f, "failed: {name}")?;
        }
        writeln!(f, "validation ({} issue(s)):", self.validation_issues())?;
        write!(f, "{}", self.validation)?;
        writeln!(
            f,
            "result: {} in {:.1}s",
            if self.is_success() { "SUCCESS" } else { "FAILED" },
            elapsed.num_milliseconds() as f64 / 1000.0
        )
    }
}

/// Everything one run shares across leagues.
struct RunContext<'a> {
    cfg: &'a BootstrapConfig,
    schema: SchemaProfile,
    cache: ReconcileCache,
    consolidated: ConsolidatedSources,
}

/// Run `$body` (which may use `?` and must use `$tx`) in its own transaction
/// (a savepoint when already inside one), keeping the run cache in step with
/// commit/rollback.
macro_rules! in_transaction {
    ($conn:expr, $cache:expr, |$tx:ident| $body:block) => {{
        $cache.checkpoint();
        let result = async {
            let mut $tx = $conn.begin().await?;
            let value = $body;
            $tx.commit().await?;
            Ok::<_, anyhow::Error>(value)
        }
        .await;
        if result.is_ok() {
            $cache.commit();
        } else {
            $cache.rollback();
        }
        result
    }};
}

/// Leagues to process: the requested one, or every league known to the
/// database, named by a league directory, or named in a consolidated file.
fn resolve_leagues(
    cfg: &BootstrapConfig,
    cache: &ReconcileCache,
    consolidated: &ConsolidatedSources,
) -> Vec<String> {
    if let Some(raw) = &cfg.league {
        return vec![normalize_league_id(raw)];
    }
    let mut codes: BTreeSet<String> = cache.league_codes().map(str::to_string).collect();
    codes.extend(discover_leagues(&cfg.data_dir));
    codes.extend(consolidated.league_codes());
    codes.into_iter().collect()
}

async fn ensure_series_linked(
    conn: &mut SqliteConnection,
    ctx: &mut RunContext<'_>,
    league_id: i64,
    name: &str,
) -> Result<(Ensured, Outcome)> {
    let series = ensure_series(conn, &mut ctx.cache, &ctx.schema, league_id, name).await?;
    let link = ensure_series_league(conn, &mut ctx.cache, &ctx.schema, series.id, league_id).await?;
    Ok((series, link))
}

async fn apply_team(
    conn: &mut SqliteConnection,
    ctx: &mut RunContext<'_>,
    league_id: i64,
    team: &TeamCandidate,
) -> Result<Ensured> {
    let series_id = match team.series.as_deref() {
        Some(name) => Some(ensure_series_linked(conn, ctx, league_id, name).await?.0.id),
        None => None,
    };
    let club_id = match team.club.as_deref() {
        Some(name) => Some(ensure_club(conn, &mut ctx.cache, name).await?.id),
        None => None,
    };
    ensure_team(
        conn,
        &mut ctx.cache,
        &ctx.schema,
        TeamSpec {
            league_id,
            team_name: &team.team_name,
            series_id,
            club_id,
        },
    )
    .await
}

async fn bootstrap_league(
    conn: &mut SqliteConnection,
    ctx: &mut RunContext<'_>,
    league_code: &str,
) -> Result<LeagueSummary> {
    let mut summary = LeagueSummary::new(league_code);
    let sources = load_league_sources(&ctx.cfg.data_dir, league_code, &ctx.consolidated);
    summary.records_loaded = sources.records.len();
    summary.record_files(&sources.counts);

    let Some(league_id) = lookup_league(conn, &mut ctx.cache, league_code).await? else {
        summary.league_not_found = sources.records.len();
        warn!(
            league = %league_code,
            kind = IssueKind::LeagueNotFound.as_str(),
            records = sources.records.len(),
            "league has no leagues row; skipping its records"
        );
        return Ok(summary);
    };

    let plan = build_league_plan(league_code, &sources.records);
    summary.conflicts = plan.conflicts;
    info!(
        league = %league_code,
        records = summary.records_loaded,
        series = plan.series.len(),
        clubs = plan.clubs.len(),
        teams = plan.teams.len(),
        "reconciled sources"
    );

    for name in plan.series_names() {
        match in_transaction!(conn, ctx.cache, |tx| {
            ensure_series_linked(&mut tx, ctx, league_id, name).await?
        }) {
            Ok((series, link)) => summary.record_series(series, link),
            Err(err) => summary.record_failure("series", name, &err),
        }
    }

    for name in &plan.clubs {
        match in_transaction!(conn, ctx.cache, |tx| {
            ensure_club(&mut tx, &mut ctx.cache, name).await?
        }) {
            Ok(club) => summary.record_club(club),
            Err(err) => summary.record_failure("club", name, &err),
        }
    }

    for team in plan.teams.values() {
        if team.series.is_none() {
            summary.teams_without_series += 1;
        }
        if !ctx.cfg.create_teams {
            summary.teams_deferred += 1;
            continue;
        }
        match in_transaction!(conn, ctx.cache, |tx| {
            apply_team(&mut tx, ctx, league_id, team).await?
        }) {
            Ok(ensured) => summary.record_team(ensured),
            Err(err) => summary.record_failure("team", &team.team_name, &err),
        }
    }

    info!(
        league = %league_code,
        series_created = summary.series_created,
        links_created = summary.series_links_created,
        clubs_created = summary.clubs_created,
        teams_created = summary.teams_created,
        teams_healed = summary.teams_healed,
        errors = summary.error_count(),
        "league bootstrapped"
    );
    Ok(summary)
}

struct RunOutput {
    consolidated: FileCounts,
    leagues: Vec<LeagueSummary>,
    validation: ValidationReport,
}

async fn run_on(conn: &mut SqliteConnection, cfg: &BootstrapConfig) -> Result<RunOutput> {
    let schema = SchemaProfile::detect(conn).await?;
    let cache = ReconcileCache::preload(conn)
        .await
        .context("preload reconcile cache")?;
    let consolidated = ConsolidatedSources::load(&cfg.data_dir);
    let mut ctx = RunContext {
        cfg,
        schema,
        cache,
        consolidated,
    };

    let leagues = resolve_leagues(cfg, &ctx.cache, &ctx.consolidated);
    if leagues.is_empty() {
        warn!(data_dir = %cfg.data_dir.display(), "no leagues to process");
    }

    let mut summaries = Vec::with_capacity(leagues.len());
    for code in &leagues {
        let summary = bootstrap_league(conn, &mut ctx, code)
            .instrument(info_span!("league", league = %code))
            .await?;
        summaries.push(summary);
    }

    let validation = validate(conn).await.context("post-bootstrap validation")?;
    Ok(RunOutput {
        consolidated: ctx.consolidated.counts,
        leagues: summaries,
        validation,
    })
}

/// Run the whole bootstrap against `db`.
pub async fn run_bootstrap(db: &Db, cfg: &BootstrapConfig) -> Result<BootstrapSummary> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let span = info_span!("bootstrap", %run_id, dry_run = cfg.dry_run);

    async {
        info!(
            data_dir = %cfg.data_dir.display(),
            league = cfg.league.as_deref().unwrap_or("all"),
            create_teams = cfg.create_teams,
            "bootstrap starting"
        );
        let mut conn = db
            .pool
            .acquire()
            .await
            .context("cannot acquire a database connection")?;
        require_core_tables(&mut conn).await?;

        let out = if cfg.dry_run {
            let mut outer = conn.begin().await?;
            let out = run_on(&mut outer, cfg).await;
            outer.rollback().await?;
            info!("dry run: all changes rolled back");
            out?
        } else {
            run_on(&mut conn, cfg).await?
        };

        Ok::<_, anyhow::Error>(BootstrapSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: cfg.dry_run,
            strict: cfg.strict,
            consolidated: out.consolidated,
            leagues: out.leagues,
            validation: out.validation,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::upsert::seed_known_leagues;
    use crate::sources::test_support::{scratch_dir, write_json};
    use std::path::Path;

    const TENNAQUA_PLAYERS: &str = r#"[
        {"League": "APTA", "Series": "Chicago 6", "Series Mapping ID": "Tennaqua - 6", "Club": "Tennaqua"}
    ]"#;

    async fn seeded_db() -> Db {
        let db = Db::connect_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        seed_known_leagues(&mut conn).await.unwrap();
        db
    }

    fn config(root: &Path, league: &str) -> BootstrapConfig {
        BootstrapConfig {
            data_dir: root.to_path_buf(),
            league: Some(league.to_string()),
            ..Default::default()
        }
    }

    async fn count(db: &Db, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn end_to_end_single_team() {
        let dir = scratch_dir("e2e");
        let root = dir.path();
        write_json(root, "APTA_CHICAGO/players.json", TENNAQUA_PLAYERS);
        write_json(root, "APTA_CHICAGO/match_history.json", "[]");
        let db = seeded_db().await;

        let summary = run_bootstrap(&db, &config(root, "APTA")).await.unwrap();
        assert!(summary.is_success(), "{summary}");
        assert_eq!(summary.validation_issues(), 0);

        let (team, club, series, league): (String, String, String, String) = sqlx::query_as(
            "SELECT t.team_name, c.name, s.name, l.league_id
             FROM teams t
             JOIN clubs c ON c.id = t.club_id
             JOIN series s ON s.id = t.series_id
             JOIN leagues l ON l.id = t.league_id",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(
            (team.as_str(), club.as_str(), series.as_str(), league.as_str()),
            ("Tennaqua - 6", "Tennaqua", "Chicago 6", "APTA_CHICAGO")
        );
        assert_eq!(count(&db, "series").await, 1);
        assert_eq!(count(&db, "series_leagues").await, 1);
        assert_eq!(count(&db, "clubs").await, 1);
        assert_eq!(count(&db, "teams").await, 1);
    }

    #[tokio::test]
    async fn rerun_is_idempotent() {
        let dir = scratch_dir("rerun");
        let root = dir.path();
        write_json(root, "APTA_CHICAGO/players.json", TENNAQUA_PLAYERS);
        write_json(
            root,
            "APTA_CHICAGO/match_history.json",
            r#"[{"League": "APTA", "Home Team": "Tennaqua - 6", "Away Team": "Winnetka - 7"}]"#,
        );
        let db = seeded_db().await;
        let cfg = config(root, "APTA_CHICAGO");

        run_bootstrap(&db, &cfg).await.unwrap();
        let tables = ["series", "series_leagues", "clubs", "teams"];
        let mut first = Vec::new();
        for t in tables {
            first.push(count(&db, t).await);
        }
        let second = run_bootstrap(&db, &cfg).await.unwrap();
        let mut after = Vec::new();
        for t in tables {
            after.push(count(&db, t).await);
        }

        assert_eq!(first, vec![2, 2, 2, 2]);
        assert_eq!(first, after);
        let totals = second.totals();
        assert_eq!(totals.series_created + totals.clubs_created + totals.teams_created, 0);
        assert_eq!(totals.teams_existing, 2);
    }

    #[tokio::test]
    async fn series_only_in_match_history_are_created() {
        let dir = scratch_dir("union");
        let root = dir.path();
        write_json(
            root,
            "NSTF/players.json",
            r#"[
                {"League": "NSTF", "Series": "Series A", "Series Mapping ID": "Wilmette Sunday A"},
                {"League": "NSTF", "Series": "Series B", "Series Mapping ID": "Wilmette Sunday B"}
            ]"#,
        );
        write_json(
            root,
            "NSTF/match_history.json",
            r#"[{"League": "NSTF", "Home Team": "Winnetka Sunday B", "Away Team": "Glencoe Sunday C"}]"#,
        );
        let db = seeded_db().await;

        let summary = run_bootstrap(&db, &config(root, "NSTF")).await.unwrap();
        assert!(summary.is_success(), "{summary}");
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM series ORDER BY name")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(names, ["Series A", "Series B", "Series C"]);
    }

    #[tokio::test]
    async fn heals_missing_club_on_rerun() {
        let dir = scratch_dir("heal");
        let root = dir.path();
        let db = seeded_db().await;
        sqlx::raw_sql(
            "INSERT INTO teams (team_name, league_id) SELECT 'Tennaqua - 6', id FROM leagues WHERE league_id = 'APTA_CHICAGO'",
        )
        .execute(&db.pool)
        .await
        .unwrap();
        write_json(root, "APTA_CHICAGO/players.json", TENNAQUA_PLAYERS);

        let summary = run_bootstrap(&db, &config(root, "APTA_CHICAGO")).await.unwrap();
        assert_eq!(summary.totals().teams_healed, 1);
        let (club_id, series_id): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT club_id, series_id FROM teams WHERE team_name = 'Tennaqua - 6'")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert!(club_id.is_some());
        assert!(series_id.is_some());

        // A later source naming another club must not repoint it.
        write_json(
            root,
            "APTA_CHICAGO/players.json",
            r#"[{"League": "APTA", "Series Mapping ID": "Tennaqua - 6", "Club": "Winnetka"}]"#,
        );
        let rerun = run_bootstrap(&db, &config(root, "APTA_CHICAGO")).await.unwrap();
        assert_eq!(rerun.totals().teams_existing, 1);
        let still: Option<i64> =
            sqlx::query_scalar("SELECT club_id FROM teams WHERE team_name = 'Tennaqua - 6'")
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert_eq!(still, club_id);
    }

    #[tokio::test]
    async fn unknown_league_records_are_errors_not_rows() {
        let dir = scratch_dir("unknown");
        let root = dir.path();
        write_json(
            root,
            "PTL_DENVER/players.json",
            r#"[{"League": "PTL_DENVER", "Series Mapping ID": "Cherry Creek 2"}]"#,
        );
        let db = seeded_db().await;

        let summary = run_bootstrap(&db, &config(root, "ptl_denver")).await.unwrap();
        assert_eq!(summary.totals().league_not_found, 1);
        assert!(!summary.is_success());
        assert_eq!(count(&db, "teams").await, 0);
        assert_eq!(count(&db, "series").await, 0);
    }

    #[tokio::test]
    async fn dry_run_rolls_everything_back() {
        let dir = scratch_dir("dry");
        let root = dir.path();
        write_json(root, "APTA_CHICAGO/players.json", TENNAQUA_PLAYERS);
        let db = seeded_db().await;
        let cfg = BootstrapConfig {
            dry_run: true,
            ..config(root, "APTA_CHICAGO")
        };

        let summary = run_bootstrap(&db, &cfg).await.unwrap();
        assert_eq!(summary.totals().teams_created, 1);
        assert!(summary.validation.is_clean());
        assert_eq!(count(&db, "teams").await, 0);
        assert_eq!(count(&db, "clubs").await, 0);
    }

    #[tokio::test]
    async fn deferring_teams_still_ensures_series_and_clubs() {
        let dir = scratch_dir("defer");
        let root = dir.path();
        write_json(root, "APTA_CHICAGO/players.json", TENNAQUA_PLAYERS);
        let db = seeded_db().await;
        let cfg = BootstrapConfig {
            create_teams: false,
            ..config(root, "APTA_CHICAGO")
        };

        let summary = run_bootstrap(&db, &cfg).await.unwrap();
        assert_eq!(summary.totals().teams_deferred, 1);
        assert_eq!(count(&db, "teams").await, 0);
        assert_eq!(count(&db, "series_leagues").await, 1);
        assert_eq!(count(&db, "clubs").await, 1);
    }

    #[tokio::test]
    async fn all_leagues_mode_covers_database_and_directories() {
        let dir = scratch_dir("all");
        let root = dir.path();
        write_json(root, "APTA_CHICAGO/players.json", TENNAQUA_PLAYERS);
        write_json(
            root,
            "all/match_history.json",
            r#"[{"League": "CNSWPL", "Home Team": "Tennaqua 12", "Away Team": "Hinsdale PC 12"}]"#,
        );
        let db = seeded_db().await;
        let cfg = BootstrapConfig {
            data_dir: root.to_path_buf(),
            ..Default::default()
        };

        let summary = run_bootstrap(&db, &cfg).await.unwrap();
        assert!(summary.is_success(), "{summary}");
        let leagues: Vec<_> = summary.leagues.iter().map(|l| l.league.as_str()).collect();
        assert!(leagues.contains(&"APTA_CHICAGO"));
        assert!(leagues.contains(&"CNSWPL"));
        assert_eq!(count(&db, "teams").await, 3);
    }

    #[tokio::test]
    async fn club_names_differing_only_in_case_share_one_row() {
        let dir = scratch_dir("club_case");
        let root = dir.path();
        write_json(
            root,
            "CNSWPL/players.json",
            r#"[
                {"League": "CNSWPL", "Series Mapping ID": "Tennaqua 12", "Club": "Tennaqua"},
                {"League": "CNSWPL", "Series Mapping ID": "TENNAQUA 11", "Club": "TENNAQUA"}
            ]"#,
        );
        let db = seeded_db().await;

        let summary = run_bootstrap(&db, &config(root, "CNSWPL")).await.unwrap();
        assert_eq!(summary.error_count(), 0, "{summary}");
        let clubs: Vec<String> = sqlx::query_scalar("SELECT name FROM clubs")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(clubs, ["Tennaqua"]);
        let distinct: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT club_id) FROM teams")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(distinct, 1);
    }

    #[tokio::test]
    async fn malformed_consolidated_file_is_one_error_per_run() {
        let dir = scratch_dir("all_bad");
        let root = dir.path();
        write_json(root, "APTA_CHICAGO/players.json", TENNAQUA_PLAYERS);
        write_json(root, "all/players.json", "[{ not json");
        let db = seeded_db().await;
        let cfg = BootstrapConfig {
            data_dir: root.to_path_buf(),
            ..Default::default()
        };

        let summary = run_bootstrap(&db, &cfg).await.unwrap();
        assert!(summary.leagues.len() > 1);
        assert_eq!(summary.consolidated.files_malformed, 1);
        assert!(summary.leagues.iter().all(|l| l.sources_malformed == 0));
        assert_eq!(summary.totals().sources_malformed, 1);
        assert_eq!(summary.error_count(), 1);
        assert!(!summary.is_success());
        assert_eq!(count(&db, "teams").await, 1);
    }

    #[test]
    fn error_count_follows_issue_taxonomy() {
        let summary = LeagueSummary {
            sources_missing: 4,
            sources_malformed: 1,
            league_not_found: 2,
            create_failures: 3,
            ..LeagueSummary::new("NSTF")
        };
        let errors: Vec<_> = IssueKind::ALL
            .into_iter()
            .filter(|kind| kind.is_error())
            .collect();
        assert_eq!(
            errors,
            [
                IssueKind::SourceMalformed,
                IssueKind::LeagueNotFound,
                IssueKind::EntityCreateFailure
            ]
        );
        assert_eq!(summary.issue_count(IssueKind::SourceMissing), 4);
        assert_eq!(summary.error_count(), 6);
    }

    #[test]
    fn strict_is_the_default() {
        assert!(BootstrapConfig::default().strict);
    }
}
