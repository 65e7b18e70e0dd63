//! Outbox configuration file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use outbox_common::{Error, Result};
use outbox_sync::{SchedulerConfig, SyncConfig};
use outbox_transport::ReqwestClientConfig;

/// Runtime configuration, stored as JSON.
///
/// Every field has a default, so a partial file (or `{}`) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Base URL of the application server.
    pub origin: String,
    /// Path probed to confirm the origin is reachable.
    pub probe_path: String,
    /// Probe deadline.
    pub probe_timeout_secs: u64,
    /// Periodic sync interval.
    pub sync_interval_secs: u64,
    /// How long a restored connection must hold before a pass starts.
    pub restore_settle_ms: u64,
    /// Cap on the backed-off sync interval.
    pub max_backoff_secs: u64,
    /// Discard queued items older than this. Unset keeps them forever.
    pub max_item_age_secs: Option<u64>,
    /// Directory holding the persisted queue. Defaults to the platform
    /// data directory.
    pub data_dir: Option<PathBuf>,
    /// Deadline for ordinary requests and replays.
    pub request_timeout_secs: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            probe_path: "/".to_string(),
            probe_timeout_secs: 5,
            sync_interval_secs: 60,
            restore_settle_ms: 2000,
            max_backoff_secs: 30 * 60,
            max_item_age_secs: None,
            data_dir: None,
            request_timeout_secs: 30,
        }
    }
}

impl OutboxConfig {
    /// Read a configuration file.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Invalid JSON
    /// - Values fail [`OutboxConfig::validate`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("Config file {}", path.display()))
            }
            _ => Error::Io(e),
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file, falling back to defaults if it is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(path) {
            Err(Error::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check values for consistency.
    ///
    /// # Errors
    /// - `origin` is not an absolute http(s) URL
    /// - A timeout or the sync interval is zero
    /// - `max_backoff_secs` is below the sync interval
    pub fn validate(&self) -> Result<()> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| Error::InvalidInput(format!("Invalid origin '{}': {}", self.origin, e)))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Origin must be http or https, got '{}'",
                origin.scheme()
            )));
        }
        if self.sync_interval_secs == 0 {
            return Err(Error::InvalidInput("sync_interval_secs must be positive".to_string()));
        }
        if self.probe_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput("Timeouts must be positive".to_string()));
        }
        if self.max_backoff_secs < self.sync_interval_secs {
            return Err(Error::InvalidInput(
                "max_backoff_secs must not be below sync_interval_secs".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute probe URL.
    pub fn probe_url(&self) -> Result<String> {
        self.resolve(&self.probe_path)
    }

    /// Resolve `path` (absolute URL or origin-relative path) against the origin.
    pub fn resolve(&self, path: &str) -> Result<String> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| Error::InvalidInput(format!("Invalid origin '{}': {}", self.origin, e)))?;
        origin
            .join(path)
            .map(String::from)
            .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {}", path, e)))
    }

    /// Directory for the persisted queue.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("outbox"))
                .ok_or_else(|| Error::NotFound("Platform data directory".to_string())),
        }
    }

    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("outbox").join("config.json"))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.sync_interval_secs),
            restore_settle: Duration::from_millis(self.restore_settle_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    pub fn sync(&self) -> SyncConfig {
        SyncConfig {
            max_item_age: self.max_item_age_secs.map(Duration::from_secs),
        }
    }

    pub fn http(&self) -> ReqwestClientConfig {
        ReqwestClientConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            ..ReqwestClientConfig::default()
        }
    }
}
