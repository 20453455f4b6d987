//! Configuration module for the church backend.
//!
//! Process configuration is loaded from environment variables with sensible defaults.
//! Notification settings (gateway credentials, template, schedule) live in the database
//! and are managed through `/api/config`.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Timeout applied to every messaging gateway request
    pub gateway_timeout: Duration,
    /// Whether the daily birthday job is started
    pub scheduler_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("CHURCH_API_PSK")
            .ok()
            .filter(|psk| !psk.trim().is_empty());

        let db_path = env::var("CHURCH_DB_PATH")
            .unwrap_or_else(|_| "./data/church.sqlite".to_string())
            .into();

        let raw_addr =
            env::var("CHURCH_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|e| format!("Invalid CHURCH_BIND_ADDR '{}': {}", raw_addr, e))?;

        let log_level = env::var("CHURCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let gateway_timeout = match env::var("CHURCH_GATEWAY_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| format!("Invalid CHURCH_GATEWAY_TIMEOUT_SECS '{}': {}", raw, e))?,
            Err(_) => Duration::from_secs(15),
        };

        let scheduler_enabled = env::var("CHURCH_SCHEDULER_ENABLED")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            gateway_timeout,
            scheduler_enabled,
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
