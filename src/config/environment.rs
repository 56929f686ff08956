// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Environment-based configuration for the device runtime

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Log level
    pub log_level: String,
    /// Backend API configuration
    pub api: ApiConfig,
    /// Local queue database configuration
    pub database: DatabaseConfig,
    /// Optional tracking thresholds file
    pub tracking_config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the tracking backend
    pub base_url: String,
    /// Bearer token; absent until the driver signs in
    pub token: Option<String>,
    /// Identifier reported with every coordinate
    pub driver_unique_id: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL of the location queue
    pub url: String,
}

impl EnvironmentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        // Load .env file if it exists
        if let Err(e) = dotenv::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }

        let config = EnvironmentConfig {
            log_level: env_var_or("RUST_LOG", "info"),
            api: ApiConfig {
                base_url: env_var_or("TRACKER_API_URL", "http://localhost:8080/api"),
                token: env::var("TRACKER_API_TOKEN").ok().filter(|t| !t.trim().is_empty()),
                driver_unique_id: env_var_or("TRACKER_DRIVER_ID", "unknown-driver"),
                request_timeout_secs: env_var_or("TRACKER_REQUEST_TIMEOUT", "30")
                    .parse()
                    .context("Invalid TRACKER_REQUEST_TIMEOUT value")?,
            },
            database: DatabaseConfig {
                url: env_var_or("DATABASE_URL", "sqlite:./data/locations.db"),
            },
            tracking_config_path: env::var("TRACKER_CONFIG_PATH").ok().map(PathBuf::from),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("TRACKER_API_URL is not a valid URL: {}", self.api.base_url))?;

        if self.database.url.is_empty() {
            return Err(anyhow::anyhow!("DATABASE_URL cannot be empty"));
        }

        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!("DATABASE_URL must be a sqlite: URL"));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("TRACKER_REQUEST_TIMEOUT must be positive"));
        }

        if self.api.token.is_none() {
            warn!("No API token configured; sync and ping cycles will be skipped until one is set");
        }

        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    pub fn summary(&self) -> String {
        format!(
            "Fleet Tracker Configuration:\n\
             - API: {}\n\
             - Token: {}\n\
             - Driver: {}\n\
             - Database: {}\n\
             - Log Level: {}",
            self.api.base_url,
            if self.api.token.is_some() { "Configured" } else { "Missing" },
            self.api.driver_unique_id,
            if self.database.url.contains(":memory:") { "In-memory" } else { "SQLite file" },
            self.log_level,
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
