use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;
use crate::booking_repo::PgStore;
use crate::reference_repo::PgReferenceData;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
    statement_timeout_ms: u64,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self { pool, statement_timeout_ms: config.statement_timeout_ms })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    pub fn booking_store(&self) -> PgStore {
        PgStore::new(self.pool.clone(), self.statement_timeout_ms)
    }

    pub fn reference_data(&self) -> PgReferenceData {
        PgReferenceData::new(self.pool.clone())
    }
}
