use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use tracing::error;

use crate::database_ops::schema::require_core_tables;
use crate::database_ops::validate::validate;

#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Optional override for the database URL
    #[arg(long)]
    pub db_url: Option<String>,
    /// Exit non-zero when any check reports issues
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

/// Run the consistency checks on their own, outside a bootstrap.
pub async fn run(args: ValidateArgs) -> Result<ExitCode> {
    let db = super::connect(args.db_url, Some(1)).await?;
    let mut conn = db.pool.acquire().await?;
    require_core_tables(&mut conn).await?;

    let report = validate(&mut conn).await?;
    let issues = report.total_issues();
    println!("validation ({issues} issue(s)):\n{report}");
    if report.into_result(args.strict).is_err() {
        error!(issues, "validation failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
