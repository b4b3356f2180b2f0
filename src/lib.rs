//! League bootstrap: loads scraped source files, reconciles series, clubs
//! and teams, and upserts them idempotently into the league database.

pub mod cli;
pub mod logging;
pub mod normalization;
pub mod pipeline;
pub mod sources;

pub mod database_ops {
    pub mod cache;
    pub mod db;
    pub mod reconcile;
    pub mod schema;
    pub mod upsert;
    pub mod validate;
}

pub mod util {
    pub mod env;
}

pub use pipeline::{run_bootstrap, BootstrapConfig, BootstrapSummary};
