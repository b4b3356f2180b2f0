pub mod bootstrap;
pub mod db_counts;
pub mod schema_audit;
pub mod validate;

use anyhow::Result;

use crate::database_ops::db::Db;
use crate::util::env as env_util;

/// Default pool size for the command-line tools. The pipeline itself holds a
/// single connection; the extra slots serve ad-hoc diagnostics.
pub const DEFAULT_MAX_CONNS: u32 = 4;

/// Open the database named by `db_url`, falling back to the env keys.
pub async fn connect(db_url: Option<String>, max_connections: Option<u32>) -> Result<Db> {
    env_util::init_env();
    let url = match db_url {
        Some(url) => url,
        None => env_util::db_url()?,
    };
    let max_conns = max_connections.unwrap_or_else(|| env_util::env_parse("DB_MAX_CONNS", DEFAULT_MAX_CONNS));
    Db::connect(&url, max_conns).await
}
