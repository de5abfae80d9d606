//! Database driver layer
//!
//! This module provides the backend-agnostic [`Driver`] boundary and one
//! implementation per supported database.

pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export the main trait
pub use traits::{Driver, DriverError, RowSet};

use crate::config::{ConnectionConfig, ConnectionError, DriverKind};

/// Open a driver session for the configured driver kind
///
/// # Errors
///
/// Returns [`ConnectionError::DriverNotEnabled`] when the driver's cargo
/// feature is disabled, otherwise whatever the driver reports while
/// connecting.
pub async fn open_driver(config: &ConnectionConfig) -> Result<Box<dyn Driver>, ConnectionError> {
    match config.driver {
        #[cfg(feature = "sqlite")]
        DriverKind::Sqlite => Ok(Box::new(sqlite::SqliteDriver::connect(config).await?)),

        #[cfg(feature = "postgres")]
        DriverKind::Postgres => Ok(Box::new(postgres::PostgresDriver::connect(config).await?)),

        #[allow(unreachable_patterns)]
        other => Err(ConnectionError::DriverNotEnabled(other)),
    }
}
