//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: HeaderValue,
    /// Base URL of the serverless functions, e.g. `https://x.functions.example/v1`.
    pub functions_url: String,
    /// Base URL of the object storage API.
    pub storage_url: String,
    pub storage_bucket: String,
    pub service_key: Option<String>,
    pub webhook_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub book_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server and Database ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin_str =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let cors_origin = cors_origin_str.parse::<HeaderValue>().map_err(|e| {
            ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
        })?;

        // --- Remote backends ---
        let functions_url = required("FUNCTIONS_URL")?.trim_end_matches('/').to_string();
        let storage_url = required("STORAGE_URL")?.trim_end_matches('/').to_string();
        let storage_bucket =
            std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "pitch-deck".to_string());
        let service_key = std::env::var("SERVICE_KEY").ok();
        let webhook_url = std::env::var("WEBHOOK_URL").ok().filter(|u| !u.trim().is_empty());

        // --- Advisor chat ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let book_path = std::env::var("BOOK_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./book"));

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            functions_url,
            storage_url,
            storage_bucket,
            service_key,
            webhook_url,
            openai_api_key,
            chat_model,
            book_path,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}
