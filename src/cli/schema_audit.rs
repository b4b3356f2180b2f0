use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};
use tracing::info;

use crate::database_ops::schema::{table_exists, SchemaProfile, CORE_TABLES};
use crate::util::env as envutil;

#[derive(Debug, Clone, Default)]
pub struct SchemaAuditConfig {
    pub database_url: Option<String>,
    pub table_filter: Option<Vec<String>>,
    /// Also write the report here (env SCHEMA_AUDIT_OUT).
    pub out_file: Option<PathBuf>,
}

pub async fn run(cfg: SchemaAuditConfig) -> Result<()> {
    envutil::init_env();
    let db = super::connect(cfg.database_url.clone(), Some(1)).await?;
    let mut conn = db.pool.acquire().await?;

    let filter = cfg.table_filter.clone().or_else(|| {
        envutil::env_opt("TABLE_FILTER").map(|raw| {
            raw.split(',')
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
    });

    let out = audit(&mut conn, filter.as_deref()).await?;
    safe_println(&out);

    if let Some(path) = cfg
        .out_file
        .clone()
        .or_else(|| envutil::env_opt("SCHEMA_AUDIT_OUT").map(PathBuf::from))
    {
        std::fs::write(&path, &out)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "schema audit written");
    }
    Ok(())
}

/// Render the audit of the core tables (optionally filtered) as text.
pub async fn audit(conn: &mut SqliteConnection, filter: Option<&[String]>) -> Result<String> {
    let mut tables: Vec<&str> = CORE_TABLES.to_vec();
    if let Some(f) = filter {
        tables.retain(|t| f.iter().any(|want| want == t));
    }

    let mut out = String::new();
    writeln!(out, "SCHEMA AUDIT: {} table(s)", tables.len()).ok();

    for table in tables {
        if !table_exists(conn, table).await? {
            writeln!(out, "\n=== {table} ===\n  (missing: not present in schema)").ok();
            continue;
        }
        writeln!(out, "\n=== {table} ===").ok();
        emit_columns(&mut out, table, conn).await?;
        emit_indexes(&mut out, table, conn).await?;
        emit_foreign_keys_out(&mut out, table, conn).await?;
        emit_foreign_keys_in(&mut out, table, conn).await?;
    }

    let profile = SchemaProfile::detect(conn).await?;
    writeln!(out, "\nOptional columns detected:\n{profile:#?}").ok();
    Ok(out)
}

async fn emit_columns(out: &mut String, table: &str, conn: &mut SqliteConnection) -> Result<()> {
    let rows = sqlx::query(
        r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    writeln!(out, "Columns (name:type:null):").ok();
    for row in rows {
        let name: String = row.get("name");
        let ty: String = row.get("type");
        let notnull: i64 = row.get("notnull");
        let default: Option<String> = row.get("dflt_value");
        let pk: i64 = row.get("pk");
        write!(
            out,
            "  {name}:{}:{}",
            if ty.is_empty() { "any" } else { ty.as_str() },
            if notnull != 0 { "not-null" } else { "null" }
        )
        .ok();
        if pk > 0 {
            write!(out, " [pk]").ok();
        }
        if let Some(d) = default {
            write!(out, " default={d}").ok();
        }
        writeln!(out).ok();
    }
    Ok(())
}

async fn emit_indexes(out: &mut String, table: &str, conn: &mut SqliteConnection) -> Result<()> {
    let indexes = sqlx::query_as::<_, (String, i64, String)>(
        r#"SELECT name, "unique", origin FROM pragma_index_list(?1) ORDER BY name"#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    if indexes.is_empty() {
        writeln!(out, "Indexes: (none)").ok();
        return Ok(());
    }
    writeln!(out, "Indexes:").ok();
    for (name, unique, origin) in indexes {
        let columns: Vec<Option<String>> =
            sqlx::query_scalar("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
                .bind(&name)
                .fetch_all(&mut *conn)
                .await?;
        let columns: Vec<String> = columns
            .into_iter()
            .map(|c| c.unwrap_or_else(|| "<expr>".to_string()))
            .collect();
        writeln!(
            out,
            "  {name} ({}){}{}",
            columns.join(", "),
            if unique != 0 { " UNIQUE" } else { "" },
            match origin.as_str() {
                "u" => " [constraint]",
                "pk" => " [primary key]",
                _ => "",
            }
        )
        .ok();
    }
    Ok(())
}

async fn emit_foreign_keys_out(
    out: &mut String,
    table: &str,
    conn: &mut SqliteConnection,
) -> Result<()> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
        r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    if rows.is_empty() {
        writeln!(out, "Foreign Keys (outgoing): (none)").ok();
    } else {
        writeln!(out, "Foreign Keys (outgoing):").ok();
        for (from, target, to) in rows {
            writeln!(out, "  {from} -> {target}.{}", to.as_deref().unwrap_or("rowid")).ok();
        }
    }
    Ok(())
}

async fn emit_foreign_keys_in(
    out: &mut String,
    table: &str,
    conn: &mut SqliteConnection,
) -> Result<()> {
    let rows = sqlx::query(
        r#"SELECT m.name AS referencing_table, f."from" AS from_col
        FROM sqlite_master m
        JOIN pragma_foreign_key_list(m.name) f
        WHERE m.type = 'table' AND f."table" = ?1
        ORDER BY m.name, f.id"#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    if rows.is_empty() {
        writeln!(out, "Foreign Keys (incoming): (none)").ok();
    } else {
        writeln!(out, "Foreign Keys (incoming):").ok();
        for row in rows {
            let referencing: String = row.get("referencing_table");
            let from: String = row.get("from_col");
            writeln!(out, "  {referencing}.{from}").ok();
        }
    }
    Ok(())
}

fn safe_println(s: &str) {
    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "{}", s);
}
