//! One-shot backend resolution at startup.
//!
//! Each backend is probed exactly once: the relational resolver tries
//! the configured MySQL target and falls back to the embedded SQLite
//! file; the document resolver pings the configured MongoDB deployment.
//! Failures are logged with full detail and reflected only in the
//! returned availability -- nothing here raises. There is no retry loop
//! and no degraded mode: a backend that fails to resolve stays
//! unavailable for the life of the process.

use askdb_core::db::SqlDialect;
use askdb_core::settings::Settings;
use mongodb::Client;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use sqlx::AnyPool;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::document::MongoAdapter;
use crate::relational::SqlAdapter;

/// Shared runtime driving the async database drivers from the
/// synchronous interactive loop.
pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime for database engines")
}

/// Resolve the relational backend: MySQL primary, SQLite file fallback.
pub fn resolve_relational(settings: &Settings, rt: &Runtime) -> Option<SqlAdapter> {
    sqlx::any::install_default_drivers();

    if let Some(url) = settings.mysql_url() {
        info!(
            "Attempting to connect to MySQL: {}:{}/{}",
            settings.mysql_host.as_deref().unwrap_or_default(),
            settings.mysql_port.as_deref().unwrap_or_default(),
            settings.mysql_db.as_deref().unwrap_or_default(),
        );
        match connect_and_ping(rt, &url) {
            Ok(pool) => {
                info!("MySQL connection successful");
                return Some(SqlAdapter::new(pool, SqlDialect::MySql));
            }
            Err(e) => {
                warn!("MySQL connection error: {e}");
                info!("Attempting to use SQLite instead");
            }
        }
    } else {
        info!("MySQL connection not configured, using SQLite");
    }

    if !settings.sqlite_path.exists() {
        warn!(
            "SQLite database file not found at {}",
            settings.sqlite_path.display()
        );
        return None;
    }
    match connect_and_ping(rt, &settings.sqlite_url()) {
        Ok(pool) => {
            info!("SQLite connection successful");
            Some(SqlAdapter::new(pool, SqlDialect::Sqlite))
        }
        Err(e) => {
            warn!("SQLite connection error: {e}");
            None
        }
    }
}

fn connect_and_ping(rt: &Runtime, url: &str) -> Result<AnyPool, sqlx::Error> {
    rt.block_on(async {
        let pool = AnyPool::connect(url).await?;
        sqlx::query("SELECT 1").fetch_one(&pool).await?;
        Ok(pool)
    })
}

/// Resolve the document backend by pinging the configured deployment.
pub fn resolve_document(settings: &Settings, rt: &Runtime) -> Option<MongoAdapter> {
    info!(
        "Attempting to connect to MongoDB: {}/{}",
        settings.mongodb_uri, settings.mongodb_db_name
    );

    let connected = rt.block_on(async {
        let options = ClientOptions::parse(&settings.mongodb_uri).await?;
        let client = Client::with_options(options)?;
        client
            .database(&settings.mongodb_db_name)
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok::<_, mongodb::error::Error>(client)
    });

    match connected {
        Ok(client) => {
            info!("MongoDB connection successful");
            Some(MongoAdapter::new(
                client,
                settings.mongodb_db_name.clone(),
                settings.schema_sample_size,
            ))
        }
        Err(e) => {
            warn!("MongoDB connection error: {e}");
            None
        }
    }
}
