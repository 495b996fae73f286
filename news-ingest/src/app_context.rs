use chrono::Duration;
use health::{HealthHandle, HealthRegistry};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::Config;

/// Process-wide resources, built once at startup and passed into the
/// components that need them rather than reached for as globals.
pub struct AppContext {
    pub pool: PgPool,
    pub liveness: HealthRegistry,
    pub worker_liveness: HealthHandle,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, sqlx::Error> {
        let options = PgPoolOptions::new().max_connections(config.max_pg_connections);
        let pool = options.connect(&config.database_url()).await?;

        let liveness = HealthRegistry::new("liveness");
        let worker_liveness = liveness
            .register("worker".to_string(), Duration::seconds(60))
            .await;

        Ok(Self {
            pool,
            liveness,
            worker_liveness,
        })
    }
}
