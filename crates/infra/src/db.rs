//! Connection pool construction and migration wiring.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, migrate::MigrateError};
use tracing::info;

/// Create a PostgreSQL connection pool.
///
/// The pool is the only way this crate talks to the database; nothing opens
/// ad-hoc connections.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Run the bundled migrations in order.
///
/// Migrations are embedded at compile time from `migrations/` and tracked in
/// `_sqlx_migrations`, so re-running is a no-op.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}
