use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Shared handle to the picking database
pub type DbPool = DatabaseConnection;

/// Pool settings for the picking database
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl DbConfig {
    /// SQLite in-memory databases live per connection, so a pool of more than
    /// one would hand out empty schemas.
    fn effective_max_connections(&self) -> u32 {
        if self.url.starts_with("sqlite::memory:") {
            1
        } else {
            self.max_connections
        }
    }
}

/// Opens a pool with default tuning
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Opens a pool with explicit tuning
///
/// # Errors
/// Returns `ServiceError::DatabaseError` when the database is unreachable
#[instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let max_connections = config.effective_max_connections();
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(config.min_connections.min(max_connections))
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    gauge!("picking_db.max_connections", max_connections as f64);

    let pool = Database::connect(opt).await.map_err(|e| {
        counter!("picking_db.connection_failures", 1);
        error!("Could not open picking database: {}", e);
        ServiceError::DatabaseError(e)
    })?;

    info!(backend = ?pool.get_database_backend(), "Picking database ready");
    Ok(pool)
}

/// Opens a pool using the application's tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    establish_connection_with_config(&DbConfig::from(cfg)).await
}

/// Applies every pending picking migration
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    let outcome = crate::migrator::Migrator::up(pool, None).await;
    match &outcome {
        Ok(()) => info!(elapsed = ?started.elapsed(), "Picking schema up to date"),
        Err(e) => error!(elapsed = ?started.elapsed(), "Picking migrations failed: {}", e),
    }
    outcome.map_err(ServiceError::DatabaseError)
}

/// Round-trips a ping to the database
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            let elapsed = started.elapsed();
            debug!(?elapsed, "Database ping ok");
            gauge!("picking_db.ping_ms", elapsed.as_millis() as f64);
            Ok(())
        }
        Err(e) => {
            counter!("picking_db.connection_failures", 1);
            error!("Database ping failed: {}", e);
            Err(ServiceError::DatabaseError(e))
        }
    }
}
