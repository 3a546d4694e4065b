//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `CALBRIDGE_TRACKER_BASE_URL`: Tracker root URL
//! - `CALBRIDGE_TRACKER_TOKEN`: Tracker bearer token
//! - `CALBRIDGE_TRACKER_PROJECT_ID`: Project new issues are created in
//! - `CALBRIDGE_TRACKER_QUERY_PROJECT_ID`: Project scope for the delta query
//!   (optional, defaults to the write project)
//! - `CALBRIDGE_CALENDAR_CLIENT_ID`: OAuth client id
//! - `CALBRIDGE_CALENDAR_CLIENT_SECRET`: OAuth client secret
//! - `CALBRIDGE_CALENDAR_REDIRECT_URL`: OAuth redirect URL
//! - `CALBRIDGE_CALENDAR_TOKEN_PATH`: Token file path
//! - `CALBRIDGE_CALENDAR_ID`: Calendar under reconciliation (optional,
//!   defaults to `primary`)
//! - `CALBRIDGE_SYNC_INTERVAL`: Scheduler tick in seconds (optional,
//!   defaults to 86400)
//! - `CALBRIDGE_DB_PATH`: Binding store file path
//! - `CALBRIDGE_DB_POOL_SIZE`: Connection pool size (optional, defaults to 4)
//!
//! ## File Locations
//! The loader probes `config.{json,toml}` and `calbridge.{json,toml}` in the
//! working directory, up to two parent directories, and next to the
//! executable.

use std::path::{Path, PathBuf};

use calbridge_domain::{
    CalBridgeError, CalendarConfig, Config, DatabaseConfig, Result, SyncConfig, TrackerConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CalBridgeError::Config` if configuration cannot be loaded from
/// either source.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(err) => {
            tracing::debug!(error = ?err, "environment incomplete, trying config file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// All required environment variables must be present. Returns an error
/// if any are missing.
pub fn load_from_env() -> Result<Config> {
    let tracker = TrackerConfig {
        base_url: env_var("CALBRIDGE_TRACKER_BASE_URL")?,
        token: env_var("CALBRIDGE_TRACKER_TOKEN")?,
        write_project_id: env_var("CALBRIDGE_TRACKER_PROJECT_ID")?,
        query_project_id: env_opt("CALBRIDGE_TRACKER_QUERY_PROJECT_ID"),
    };

    let calendar = CalendarConfig {
        client_id: env_var("CALBRIDGE_CALENDAR_CLIENT_ID")?,
        client_secret: env_var("CALBRIDGE_CALENDAR_CLIENT_SECRET")?,
        redirect_url: env_var("CALBRIDGE_CALENDAR_REDIRECT_URL")?,
        token_path: env_var("CALBRIDGE_CALENDAR_TOKEN_PATH")?,
        calendar_id: env_opt("CALBRIDGE_CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
    };

    let sync = match env_opt("CALBRIDGE_SYNC_INTERVAL") {
        Some(raw) => SyncConfig {
            interval_seconds: raw.parse::<u64>().map_err(|err| {
                CalBridgeError::Config(format!("Invalid sync interval: {err}"))
            })?,
        },
        None => SyncConfig::default(),
    };

    let database = DatabaseConfig {
        path: env_var("CALBRIDGE_DB_PATH")?,
        pool_size: match env_opt("CALBRIDGE_DB_POOL_SIZE") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|err| CalBridgeError::Config(format!("Invalid pool size: {err}")))?,
            None => 4,
        },
    };

    Ok(Config { tracker, calendar, sync, database })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalBridgeError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalBridgeError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|err| CalBridgeError::Config(format!("Failed to read config file: {err}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|err| CalBridgeError::Config(format!("Invalid TOML format: {err}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|err| CalBridgeError::Config(format!("Invalid JSON format: {err}"))),
        _ => Err(CalBridgeError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("calbridge.json"),
            cwd.join("calbridge.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
            cwd.join("../../config.json"),
            cwd.join("../../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("calbridge.json"),
                exe_dir.join("calbridge.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        CalBridgeError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Get optional environment variable, treating empty values as unset
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
