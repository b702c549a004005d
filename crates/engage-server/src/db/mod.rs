//! PostgreSQL backing store

pub mod postgres;
pub mod schema;

use anyhow::Result;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

pub use postgres::PgRepository;

pub type DbPool = Pool;

/// Connect and bring the schema up to date.
pub async fn init_db(database_url: &str) -> Result<DbPool> {
    let pool = create_pool(database_url)?;
    let client = pool.get().await?;
    schema::run_migrations(&client).await?;
    info!("Database initialized");
    Ok(pool)
}

fn create_pool(database_url: &str) -> Result<DbPool> {
    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(pool)
}
