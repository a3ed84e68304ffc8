//! services/api/src/error.rs
//!
//! Startup and serving failures of the `api` binary. Request-level errors are
//! mapped to responses in `web::errors` and never reach this type.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not connect to the database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Database migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The LISTEN connection behind the realtime change feed.
    #[error("Could not start the change feed: {0}")]
    ChangeFeed(#[source] sqlx::Error),

    #[error("Could not bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}
