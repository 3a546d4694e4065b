//! Application configuration structures
//!
//! Populated by the infra config loader from environment variables or a
//! JSON/TOML file.

use serde::Deserialize;

/// Top-level configuration for the daemon
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub database: DatabaseConfig,
}

/// Issue tracker connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Root URL of the tracker instance, without a trailing slash.
    pub base_url: String,
    /// Permanent bearer token.
    pub token: String,
    /// Project that receives issues created from calendar events.
    pub write_project_id: String,
    /// Project scope for the delta query; defaults to the write project.
    #[serde(default)]
    pub query_project_id: Option<String>,
}

impl TrackerConfig {
    /// Project id used for "updated since" and deletion queries.
    pub fn query_project_id(&self) -> &str {
        self.query_project_id.as_deref().unwrap_or(&self.write_project_id)
    }
}

/// Calendar OAuth credentials and target calendar
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    /// File the OAuth token set is persisted to.
    pub token_path: String,
    /// `"primary"` addresses the account's default calendar.
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

/// Scheduler settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { interval_seconds: default_sync_interval() }
    }
}

/// Binding store settings
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_sync_interval() -> u64 {
    86_400 // 24 hours
}

fn default_pool_size() -> u32 {
    4
}
