//! Shared configuration for the mediascout workspace.
//!
//! Everything here is parsed once at startup from environment variables
//! and handed down to the db/scraper/server crates as plain structs.

mod app_config;
mod config;

pub use app_config::{AppConfig, Environment, ScrapingConfig};
pub use config::{load_app_config, load_app_config_from_env};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
