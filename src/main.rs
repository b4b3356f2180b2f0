use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use rally_etl::cli::bootstrap::{run, BootstrapArgs};
use rally_etl::logging::{init_tracing, DEFAULT_FILTER};
use rally_etl::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "rally_etl",
    version,
    about = "Bootstrap series, clubs and teams from scraped league data"
)]
struct Cli {
    #[command(flatten)]
    args: BootstrapArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();
    run(cli.args).await
}
