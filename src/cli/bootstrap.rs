use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{error, info};

use crate::pipeline::{run_bootstrap, BootstrapConfig, BootstrapSummary};
use crate::util::env as env_util;

#[derive(Args, Debug, Clone, Default)]
pub struct BootstrapArgs {
    /// League to bootstrap (aliases like APTA are accepted); all leagues when omitted
    #[arg(long)]
    pub league: Option<String>,
    /// Root holding per-league source directories (default: env RALLY_DATA_DIR or data/leagues)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Optional override for the database URL
    #[arg(long)]
    pub db_url: Option<String>,
    /// Only ensure series, links and clubs; leave teams to the team importer
    #[arg(long, default_value_t = false)]
    pub skip_teams: bool,
    /// Run every write inside a transaction that is rolled back at the end
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Report validation issues without failing the run. Runs are strict by
    /// default: validation issues alone give a non-zero exit status
    #[arg(long, default_value_t = false)]
    pub warn_only: bool,
    /// Optional override for max pool connections
    #[arg(long)]
    pub max_connections: Option<u32>,
    /// Apply embedded migrations before bootstrapping
    #[arg(long, default_value_t = false)]
    pub migrate: bool,
    /// Print the run summary as JSON instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl BootstrapArgs {
    /// Env-derived defaults with command-line flags layered on top.
    pub fn to_config(&self) -> BootstrapConfig {
        let mut cfg = BootstrapConfig::from_env();
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if self.league.is_some() {
            cfg.league = self.league.clone();
        }
        if self.skip_teams {
            cfg.create_teams = false;
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
        if self.warn_only {
            cfg.strict = false;
        }
        cfg
    }
}

fn emit(summary: &BootstrapSummary, json: bool) -> Result<()> {
    if json {
        let body = serde_json::to_string_pretty(summary).context("serialize run summary")?;
        println!("{body}");
    } else {
        println!("{summary}");
    }
    Ok(())
}

/// Config keys echoed (redacted) at the start of a run.
const LOGGED_KEYS: &[&str] = &[
    "RALLY_DATABASE_URL",
    "DATABASE_URL",
    "RALLY_DATA_DIR",
    "RALLY_LEAGUE",
    "RALLY_CREATE_TEAMS",
    "RALLY_STRICT",
    "DB_MAX_CONNS",
    "AUTO_MIGRATE",
];

pub async fn run(args: BootstrapArgs) -> Result<ExitCode> {
    env_util::preflight_check("bootstrap", &[], LOGGED_KEYS)?;
    let cfg = args.to_config();
    let db = super::connect(args.db_url.clone(), args.max_connections).await?;
    if args.migrate {
        let applied = db.run_migrations().await?;
        info!(applied, "migrations applied");
    }

    let summary = run_bootstrap(&db, &cfg).await?;
    emit(&summary, args.json)?;

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            errors = summary.error_count(),
            validation_issues = summary.validation_issues(),
            strict = summary.strict,
            "bootstrap finished with failures"
        );
        Ok(ExitCode::FAILURE)
    }
}
