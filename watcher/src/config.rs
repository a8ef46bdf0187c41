//! Configuration management for the watcher.

use rill_engine::{SeedOptions, ViewSpec};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::watcher::WatcherOptions;

/// Watcher configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Base URL of the PostgREST API
    pub postgrest_url: String,
    /// JSON file holding the view declarations
    pub views_file: PathBuf,
    /// Pause between two successful poll cycles
    pub poll_interval: Duration,
    /// Pause after a failed poll cycle
    pub retry_delay: Duration,
    /// Soft-delete column excluded from snapshots
    pub soft_delete_field: Option<String>,
    /// Capacity of the update broadcast channel
    pub update_channel_capacity: usize,
}

impl WatcherConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let postgrest_url = lookup("POSTGREST_URL")
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingPostgrestUrl)?;

        let views_file = lookup("VIEWS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("views.json"));

        let poll_interval =
            Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 5)?);
        let retry_delay = Duration::from_millis(parse_or(&lookup, "RETRY_DELAY_MS", 1000)?);

        let soft_delete_field = match lookup("SOFT_DELETE_FIELD") {
            Some(field) if field.is_empty() => None,
            Some(field) => Some(field),
            None => Some("deleted_at".to_string()),
        };

        let update_channel_capacity = parse_or(&lookup, "UPDATE_CHANNEL_CAPACITY", 256)?;
        if update_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "UPDATE_CHANNEL_CAPACITY",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            postgrest_url,
            views_file,
            poll_interval,
            retry_delay,
            soft_delete_field,
            update_channel_capacity,
        })
    }

    /// Options for a [`Watcher`](crate::Watcher) built from this configuration.
    pub fn watcher_options(&self) -> WatcherOptions {
        let seed = match &self.soft_delete_field {
            Some(field) => SeedOptions::default().with_soft_delete_field(field.clone()),
            None => SeedOptions::default(),
        };
        WatcherOptions {
            seed,
            update_channel_capacity: self.update_channel_capacity,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> std::result::Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

/// Read a JSON array of view declarations.
pub fn load_views(path: &Path) -> Result<Vec<ViewSpec<String>>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("POSTGREST_URL environment variable is required")]
    MissingPostgrestUrl,

    #[error("Invalid {name} value: {value:?}")]
    Invalid { name: &'static str, value: String },
}
