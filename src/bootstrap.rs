//! Wiring of the PostgreSQL store and the URL probe from [`Config`].

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::domain::probe::UrlProbe;
use crate::infrastructure::persistence::PgStore;
use crate::infrastructure::probe::{AcceptAllProbe, HttpUrlProbe};
use crate::state::AppState;

/// Opens the connection pool with the configured limits.
///
/// # Errors
///
/// Returns an error if the database cannot be reached.
pub async fn connect(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Connected to database"
    );
    Ok(pool)
}

/// Applies the embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;

    tracing::info!("Migrations applied");
    Ok(())
}

/// HTTP probe when enabled, otherwise one that accepts every URL.
pub fn probe(config: &Config) -> Result<Arc<dyn UrlProbe>> {
    if !config.probe_enabled {
        tracing::info!("URL probe disabled");
        return Ok(Arc::new(AcceptAllProbe));
    }

    let probe = HttpUrlProbe::new(config.probe_timeout()).context("Failed to build URL probe")?;
    Ok(Arc::new(probe))
}

/// Builds the service graph over an already migrated pool.
pub fn state(config: &Config, pool: PgPool) -> Result<AppState<PgStore>> {
    let store = Arc::new(PgStore::new(Arc::new(pool)));
    Ok(AppState::new(store, probe(config)?, config.metering.clone()))
}
