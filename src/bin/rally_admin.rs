use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use rally_etl::cli::bootstrap::BootstrapArgs;
use rally_etl::cli::validate::ValidateArgs;
use rally_etl::cli::connect;
use rally_etl::database_ops::upsert::seed_known_leagues;
use rally_etl::logging::{init_tracing, DEFAULT_FILTER};
use rally_etl::util::env;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rally_admin", version, about = "Rally league database admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Load sources and upsert series, clubs and teams for one or all leagues
    Bootstrap(BootstrapArgs),
    /// Run the post-bootstrap consistency checks
    Validate(ValidateArgs),
    /// Print row counts for the league tables
    DbCounts {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Skip the per-league breakdown
        #[arg(long, default_value_t = false)]
        no_per_league: bool,
    },
    /// Emit a schema audit for the league tables
    SchemaAudit {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Optional comma-separated filter of tables
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Also write the report to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Apply embedded migrations
    Migrate {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Insert the known league rows that are missing
    SeedLeagues {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;

    if env::env_flag("RALLY_ADMIN_LIST_SUBCOMMANDS", false) {
        let names: Vec<String> = Cli::command()
            .get_subcommands()
            .map(|cmd| cmd.get_name().to_string())
            .collect();
        eprintln!("available subcommands: {:?}", names);
        return Ok(ExitCode::SUCCESS);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Bootstrap(args) => return rally_etl::cli::bootstrap::run(args).await,
        Commands::Validate(args) => return rally_etl::cli::validate::run(args).await,
        Commands::DbCounts {
            db_url,
            no_per_league,
        } => {
            use rally_etl::cli::db_counts::{run, DbCountsConfig};
            let cfg = DbCountsConfig {
                database_url: db_url,
                per_league: if no_per_league { Some(false) } else { None },
            };
            run(cfg).await?;
        }
        Commands::SchemaAudit { db_url, tables, out } => {
            use rally_etl::cli::schema_audit::{run, SchemaAuditConfig};
            let table_filter = tables.map(|vals| {
                vals.into_iter()
                    .map(|t| t.trim().to_ascii_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            });
            run(SchemaAuditConfig {
                database_url: db_url,
                table_filter,
                out_file: out,
            })
            .await?;
        }
        Commands::Migrate { db_url } => {
            let db = connect(db_url, Some(1)).await?;
            let applied = db.run_migrations().await?;
            info!(applied, "migrate: completed");
        }
        Commands::SeedLeagues { db_url } => {
            let db = connect(db_url, Some(1)).await?;
            let mut conn = db.pool.acquire().await?;
            let inserted = seed_known_leagues(&mut conn).await?;
            info!(inserted, "seed-leagues: completed");
        }
    }
    Ok(ExitCode::SUCCESS)
}
