//! Connection pool setup and migration runner, the Postgres analog of the
//! teacher's `ResumeDb::open_default`/`migrate`.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

/// Open a connection pool against `database_url` and run any pending
/// migrations. Safe to call from every worker process at startup: migrations
/// are idempotent (`CREATE TABLE IF NOT EXISTS`) and `sqlx::migrate!` takes
/// its own advisory lock for the duration of the run.
pub async fn connect_and_migrate(database_url: &str) -> anyhow::Result<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
