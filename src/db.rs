use std::time::Duration;

use anyhow::Context;
use log::LevelFilter;
use sqlx::{postgres::PgPoolOptions, ConnectOptions, PgPool};

use crate::config::AppConfig;

/// Opens the pool. Statements log at debug, anything slower than a second at warn.
pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let options = config
        .database
        .connect_options()?
        .log_statements(LevelFilter::Debug)
        .log_slow_statements(LevelFilter::Warn, Duration::from_secs(1));

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .context("connect to database")
}

/// Creates or alters the `users` and `expenses` tables.
pub async fn migrate(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run migrations")?;
    Ok(())
}
