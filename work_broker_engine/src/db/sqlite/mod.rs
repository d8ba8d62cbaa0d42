pub mod db;

pub mod disputes;
pub mod experts;
pub mod orders;
pub mod ratings;
pub mod statistics;

use std::{env, str::FromStr, time::Duration};

pub use db::SqliteDatabase;
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::db::common::BrokerError;

const SQLITE_DB_URL: &str = "sqlite://data/broker_store.db";

pub fn db_url() -> String {
    let result = env::var("EWB_DATABASE_URL").unwrap_or_else(|_| {
        info!("EWB_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, BrokerError> {
    // Writers queue on the busy timeout instead of failing fast; conditional updates stay single-statement so the
    // wait never spans more than one claim or transition.
    let options =
        SqliteConnectOptions::from_str(url)?.busy_timeout(Duration::from_secs(10)).journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Creates the database file if it does not exist yet.
pub async fn create_database(url: &str) -> Result<(), BrokerError> {
    use sqlx::migrate::MigrateDatabase;
    if !sqlx::Sqlite::database_exists(url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(url).await?;
        info!("Created Sqlite database {url}");
    }
    Ok(())
}

/// Applies the schema migrations to the connected database. Safe to re-run; already-applied migrations are
/// skipped.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), BrokerError> {
    sqlx::migrate!("./src/db/sqlite/migrations")
        .run(pool)
        .await
        .map_err(|e| BrokerError::DatabaseError(e.to_string()))?;
    info!("Migrations complete");
    Ok(())
}
