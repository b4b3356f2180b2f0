//! Schema introspection. The bootstrap runs against databases owned by the
//! web app, whose tables drifted over time, so optional columns are detected
//! at runtime instead of assumed.

use anyhow::{bail, Result};
use sqlx::SqliteConnection;

/// Tables the bootstrap reads and writes. `leagues` must be pre-populated.
pub const CORE_TABLES: [&str; 5] = ["leagues", "series", "series_leagues", "clubs", "teams"];

pub async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool> {
    let n: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .bind(table)
            .fetch_one(&mut *conn)
            .await?;
    Ok(n > 0)
}

pub async fn table_column_exists(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
) -> Result<bool> {
    Ok(column_presence(conn, table, column).await? != ColumnPresence::Absent)
}

/// True when the column exists and is declared NOT NULL.
pub async fn column_is_not_null(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
) -> Result<bool> {
    Ok(column_presence(conn, table, column).await? == ColumnPresence::Required)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnPresence {
    #[default]
    Absent,
    Nullable,
    Required,
}

impl ColumnPresence {
    pub fn exists(self) -> bool {
        self != ColumnPresence::Absent
    }
}

pub async fn column_presence(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
) -> Result<ColumnPresence> {
    let notnull: Option<i64> =
        sqlx::query_scalar(r#"SELECT "notnull" FROM pragma_table_info(?1) WHERE name = ?2"#)
            .bind(table)
            .bind(column)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(match notnull {
        None => ColumnPresence::Absent,
        Some(0) => ColumnPresence::Nullable,
        Some(_) => ColumnPresence::Required,
    })
}

/// Fail fast when any core table is missing; nothing useful can happen without them.
pub async fn require_core_tables(conn: &mut SqliteConnection) -> Result<()> {
    let mut missing = Vec::new();
    for t in CORE_TABLES {
        if !table_exists(conn, t).await? {
            missing.push(t);
        }
    }
    if !missing.is_empty() {
        bail!("required tables missing: {missing:?} (run `rally_admin migrate` first)");
    }
    Ok(())
}

/// Optional-column layout of the tables the upserts write to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaProfile {
    pub series_display_name: ColumnPresence,
    /// Legacy direct FK from series to leagues.
    pub series_league_id: ColumnPresence,
    pub teams_display_name: ColumnPresence,
    pub teams_is_active: ColumnPresence,
    pub teams_updated_at: ColumnPresence,
}

impl SchemaProfile {
    pub async fn detect(conn: &mut SqliteConnection) -> Result<Self> {
        Ok(Self {
            series_display_name: column_presence(conn, "series", "display_name").await?,
            series_league_id: column_presence(conn, "series", "league_id").await?,
            teams_display_name: column_presence(conn, "teams", "display_name").await?,
            teams_is_active: column_presence(conn, "teams", "is_active").await?,
            teams_updated_at: column_presence(conn, "teams", "updated_at").await?,
        })
    }
}
