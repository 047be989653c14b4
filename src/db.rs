use std::time::Duration;

use diesel::{prelude::*, r2d2, sql_query};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::config::AppConfig;
use crate::error::ServiceError;

pub type DbPool = r2d2::Pool<r2d2::ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn initialize_db_pool(config: &AppConfig) -> Result<DbPool, ServiceError> {
    let manager = r2d2::ConnectionManager::<PgConnection>::new(&config.database_url);
    r2d2::Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(30))
        .build(manager)
        .map_err(|e| ServiceError::internal(format!("Failed to create database pool: {}", e)))
}

pub fn run_migrations(conn: &mut PgConnection) -> Result<usize, ServiceError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| ServiceError::internal(format!("Failed to run migrations: {}", e)))?;
    Ok(applied.len())
}

/// Bounds the rest of the enclosing transaction. Must be called inside `conn.transaction`.
pub fn set_transaction_deadline(conn: &mut PgConnection, deadline: Duration) -> Result<(), ServiceError> {
    sql_query(format!("SET LOCAL statement_timeout = {}", deadline.as_millis().max(1)))
        .execute(conn)?;
    Ok(())
}
