use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Connection, Row, SqlitePool,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env::{env_flag, env_parse, redact_dsn};

/// Numbered migrations, applied in order and tracked in `_rally_migrations`.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "rally_core",
    include_str!("../../migrations/0001_rally_core.sql"),
)];

#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database URL {}", redact_dsn(database_url)))?
            .create_if_missing(true)
            .foreign_keys(env_flag("SQLITE_FOREIGN_KEYS", true))
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(env_parse(
                "SQLITE_BUSY_TIMEOUT_MS",
                5_000u64,
            )));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .with_context(|| format!("cannot connect to {}", redact_dsn(database_url)))?;
        info!(max_connections, "connected to db");

        // Optional auto-migrate gate (default: OFF). The bootstrap must run
        // against databases whose schema is owned by the web app.
        let db = Self { pool };
        if env_flag("AUTO_MIGRATE", false) {
            info!("running migrations (AUTO_MIGRATE=on)");
            db.run_migrations().await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(db)
    }

    /// Private in-memory database with the core schema applied.
    ///
    /// The pool is pinned to a single connection that never idles out, since
    /// every `sqlite::memory:` connection is its own database.
    pub async fn connect_in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Apply every embedded migration not yet recorded. Returns how many ran.
    pub async fn run_migrations(&self) -> Result<usize> {
        let mut conn = self.pool.acquire().await?;
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _rally_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                installed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
             )",
        )
        .execute(&mut *conn)
        .await?;

        let applied: HashSet<i64> = sqlx::query("SELECT version FROM _rally_migrations")
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|r| r.try_get::<i64, _>(0))
            .collect::<Result<_, _>>()?;

        let mut ran = 0usize;
        for &(version, description, sql) in MIGRATIONS {
            if applied.contains(&version) {
                continue;
            }
            let mut tx = conn.begin().await?;
            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {version}_{description} failed"))?;
            sqlx::query("INSERT INTO _rally_migrations (version, description) VALUES (?1, ?2)")
                .bind(version)
                .bind(description)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(version, description, "applied migration");
            ran += 1;
        }
        Ok(ran)
    }
}
