use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter used by the bootstrap binaries when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// The caller provides a fallback filter string that is used when `RUST_LOG` is
/// not set. Log lines go to stdout so they interleave with the run summary.
/// `LOG_SOURCE_LOCATION=1` adds file/line to every event.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let with_location = crate::util::env::env_flag("LOG_SOURCE_LOCATION", false);

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_line_number(with_location)
        .with_file(with_location)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
