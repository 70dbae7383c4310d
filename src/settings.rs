//! Client Settings
//!
//! Environment-driven configuration for the config loader and the cloud
//! session.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::cloud::CloudConfig;
use crate::config::{ConfigFormat, LoaderConfig, SNAPSHOT_FILE_NAME};

/// Everything the client needs to start.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Remote document URL. Without one the client reads a sheet from
    /// `data_dir`.
    pub config_url: Option<String>,
    /// Directory holding the snapshot and the local store.
    pub data_dir: PathBuf,
    /// Config loader settings.
    pub loader: LoaderConfig,
    /// Cloud session settings.
    pub cloud: CloudConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            config_url: None,
            loader: LoaderConfig {
                cache_path: data_dir.join(SNAPSHOT_FILE_NAME),
                ..Default::default()
            },
            data_dir,
            cloud: CloudConfig::default(),
        }
    }
}

impl ClientSettings {
    /// Load settings from `ARMORY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through `lookup`, falling back to defaults for absent
    /// or malformed values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        settings.config_url = lookup("ARMORY_CONFIG_URL").filter(|url| !url.trim().is_empty());

        if let Some(dir) = lookup("ARMORY_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
            settings.loader.cache_path = settings.data_dir.join(SNAPSHOT_FILE_NAME);
        }

        if let Some(format) = lookup("ARMORY_CONFIG_FORMAT") {
            match format.parse::<ConfigFormat>() {
                Ok(format) => settings.loader.format = format,
                Err(e) => warn!("Ignoring ARMORY_CONFIG_FORMAT: {}", e),
            }
        }

        if let Some(timeout) = seconds(&lookup, "ARMORY_FETCH_TIMEOUT_SECS") {
            settings.loader.fetch_timeout = timeout;
        }
        if let Some(delay) = seconds(&lookup, "ARMORY_RETRY_DELAY_SECS") {
            settings.cloud.outbox.retry_delay = delay;
        }

        if let Some(v) = lookup("ARMORY_FETCH_ON_START") {
            settings.loader.fetch_on_start = flag(&v);
        }
        if let Some(v) = lookup("ARMORY_AUTO_AUTHORIZE") {
            settings.cloud.auto_authorize = flag(&v);
        }

        settings
    }
}

fn flag(value: &str) -> bool {
    value == "true" || value == "1"
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Duration> {
    let raw = lookup(name)?;
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        _ => {
            warn!("Ignoring {}: not a positive number of seconds: {}", name, raw);
            None
        }
    }
}
