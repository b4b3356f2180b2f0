//! Post-hoc consistency checks run after a bootstrap. Checks only count and
//! sample offending rows; whether a non-zero count is fatal is the caller's call.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::fmt;
use tracing::{info, warn};

const SAMPLE_LIMIT: i64 = 5;

struct CheckSpec {
    name: &'static str,
    description: &'static str,
    /// `FROM` clause; the offending row's id and label are selected from it.
    from: &'static str,
    id: &'static str,
    label: &'static str,
    predicate: &'static str,
}

const CHECKS: &[CheckSpec] = &[
    CheckSpec {
        name: "orphaned_series",
        description: "series with no series_leagues link to an existing league",
        from: "series s",
        id: "s.id",
        label: "s.name",
        predicate: "NOT EXISTS (
            SELECT 1 FROM series_leagues sl
            JOIN leagues l ON l.id = sl.league_id
            WHERE sl.series_id = s.id)",
    },
    CheckSpec {
        name: "invalid_team_references",
        description: "teams whose league_id, series_id or club_id points at a missing row",
        from: "teams t",
        id: "t.id",
        label: "t.team_name",
        predicate: "NOT EXISTS (SELECT 1 FROM leagues l WHERE l.id = t.league_id)
            OR (t.series_id IS NOT NULL AND NOT EXISTS (SELECT 1 FROM series s WHERE s.id = t.series_id))
            OR (t.club_id IS NOT NULL AND NOT EXISTS (SELECT 1 FROM clubs c WHERE c.id = t.club_id))",
    },
    CheckSpec {
        name: "unlinked_series",
        description: "series not referenced by any series_leagues row",
        from: "series s",
        id: "s.id",
        label: "s.name",
        predicate: "NOT EXISTS (SELECT 1 FROM series_leagues sl WHERE sl.series_id = s.id)",
    },
    CheckSpec {
        name: "team_series_outside_league",
        description: "teams whose series is not linked to the team's own league",
        from: "teams t",
        id: "t.id",
        label: "t.team_name",
        predicate: "t.series_id IS NOT NULL
            AND EXISTS (SELECT 1 FROM series s WHERE s.id = t.series_id)
            AND NOT EXISTS (
                SELECT 1 FROM series_leagues sl
                WHERE sl.series_id = t.series_id AND sl.league_id = t.league_id)",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct ValidationCheck {
    pub name: &'static str,
    pub description: &'static str,
    pub count: i64,
    /// Up to a handful of `(id, label)` pairs of offending rows.
    pub samples: Vec<(i64, String)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<ValidationCheck>,
}

impl ValidationReport {
    pub fn total_issues(&self) -> i64 {
        self.checks.iter().map(|c| c.count).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total_issues() == 0
    }

    pub fn check(&self, name: &str) -> Option<&ValidationCheck> {
        self.checks.iter().find(|c| c.name == name)
    }

    /// In strict mode any issue is an error; otherwise the report passes through.
    pub fn into_result(self, strict: bool) -> Result<Self> {
        if strict && !self.is_clean() {
            bail!("validation failed with {} issue(s)\n{}", self.total_issues(), self);
        }
        Ok(self)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.checks {
            let marker = if c.count == 0 { "ok " } else { "!! " };
            writeln!(f, "  {marker}{:<28} {:>6}  {}", c.name, c.count, c.description)?;
            for (id, label) in &c.samples {
                writeln!(f, "        - #{id} {label}")?;
            }
        }
        Ok(())
    }
}

/// Run every check against the current state of the database.
pub async fn validate(conn: &mut SqliteConnection) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    for spec in CHECKS {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            spec.from, spec.predicate
        ))
        .fetch_one(&mut *conn)
        .await?;

        let samples = if count > 0 {
            sqlx::query_as::<_, (i64, String)>(&format!(
                "SELECT {}, {} FROM {} WHERE {} ORDER BY {} LIMIT {SAMPLE_LIMIT}",
                spec.id, spec.label, spec.from, spec.predicate, spec.id
            ))
            .fetch_all(&mut *conn)
            .await?
        } else {
            Vec::new()
        };

        if count > 0 {
            warn!(check = spec.name, count, "validation issue");
        } else {
            info!(check = spec.name, "validation ok");
        }
        report.checks.push(ValidationCheck {
            name: spec.name,
            description: spec.description,
            count,
            samples,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::db::Db;

    #[tokio::test]
    async fn clean_database_reports_no_issues() {
        let db = Db::connect_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let report = validate(&mut conn).await.unwrap();
        assert_eq!(report.checks.len(), CHECKS.len());
        assert!(report.is_clean());
        assert!(report.into_result(true).is_ok());
    }

    #[tokio::test]
    async fn detects_orphaned_and_unlinked_series() {
        let db = Db::connect_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        sqlx::raw_sql(
            "INSERT INTO series (id, name, display_name) VALUES (7, 'Series 9', 'Series 9');",
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let report = validate(&mut conn).await.unwrap();
        let orphaned = report.check("orphaned_series").unwrap();
        assert!(orphaned.count >= 1);
        assert_eq!(orphaned.samples, vec![(7, "Series 9".to_string())]);
        assert_eq!(report.check("unlinked_series").unwrap().count, 1);
        assert!(report.clone().into_result(false).is_ok());
        assert!(report.into_result(true).is_err());
    }

    #[tokio::test]
    async fn detects_dangling_team_references() {
        let db = Db::connect_in_memory().await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        sqlx::raw_sql(
            "PRAGMA foreign_keys = OFF;
             INSERT INTO leagues (id, league_id, league_name) VALUES (1, 'NSTF', 'NSTF');
             INSERT INTO series (id, name, display_name) VALUES (2, 'Series 2A', 'Series 2A');
             INSERT INTO series_leagues (series_id, league_id) VALUES (2, 99);
             INSERT INTO teams (id, team_name, league_id, club_id) VALUES (3, 'Ghost S1', 1, 404);
             INSERT INTO teams (id, team_name, league_id, series_id) VALUES (4, 'Birchwood S2A', 1, 2);",
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let report = validate(&mut conn).await.unwrap();
        assert_eq!(report.check("invalid_team_references").unwrap().count, 1);
        // linked, but only to a league that does not exist
        assert_eq!(report.check("orphaned_series").unwrap().count, 1);
        assert_eq!(report.check("unlinked_series").unwrap().count, 0);
        assert_eq!(report.check("team_series_outside_league").unwrap().count, 1);
        assert_eq!(report.total_issues(), 3);
    }
}
