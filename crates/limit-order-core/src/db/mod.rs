//! Persistence for transaction records.

pub mod memory;
pub mod store;
pub mod transactions;

pub use memory::MemoryTransactionStore;
pub use store::{TransactionQuery, TransactionStore};
pub use transactions::PgTransactionStore;

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

/// Run database migrations from `dir` (normally `./migrations`).
pub async fn run_migrations(pool: &PgPool, dir: &Path) -> Result<()> {
    let migrator = sqlx::migrate::Migrator::new(dir).await?;
    migrator.run(pool).await?;
    Ok(())
}
