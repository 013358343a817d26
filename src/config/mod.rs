//! Configuration management for the offline layer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Name of the response-cache generation built into this binary.
///
/// Bumping the crate version on deploy retires every older generation at
/// the next activation.
pub const DEFAULT_CACHE_NAME: &str = concat!("frc-pm-v", env!("CARGO_PKG_VERSION"));

/// Page served to HTML requests when nothing else is available
pub const DEFAULT_OFFLINE_URL: &str = "/offline.html";

/// Resources cached on install
pub const DEFAULT_PRECACHE: [&str; 9] = [
    "/",
    "/offline.html",
    "/static/css/bootstrap.min.css",
    "/static/js/bootstrap.bundle.min.js",
    "/static/js/offline-manager.js",
    "/static/js/cache-manager.js",
    "/static/js/sync-manager.js",
    "/webjars/font-awesome/6.4.0/css/all.min.css",
    "/favicon.ico",
];

/// Third-party hosts whose responses are intercepted and cached
pub const DEFAULT_CDN_HOSTS: [&str; 5] = [
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "unpkg.com",
    "fonts.googleapis.com",
    "fonts.gstatic.com",
];

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Origin of the project-management application (scheme://host[:port])
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Current response-cache generation
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Offline page path
    #[serde(default = "default_offline_url")]
    pub offline_url: String,

    /// CDN hosts allowed through the router
    #[serde(default = "default_cdn_hosts")]
    pub cdn_hosts: Vec<String>,

    /// Install manifest
    #[serde(default = "default_precache")]
    pub precache: Vec<String>,

    /// Persistent store settings
    #[serde(default)]
    pub store: StoreSettings,

    /// Network adapter settings
    #[serde(default)]
    pub network: NetworkSettings,

    /// Background task intervals
    #[serde(default)]
    pub schedule: ScheduleSettings,

    /// Preload behavior
    #[serde(default)]
    pub preload: PreloadSettings,
}

/// Which store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackendChoice {
    /// Probe the durable backend, fall back to the bounded one
    #[default]
    Auto,
    /// Durable SQLite backend only
    Durable,
    /// Bounded in-process backend only
    Bounded,
}

/// Persistent store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackendChoice,

    /// Data directory (defaults to the platform cache dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Network adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Per-request timeout applied by the HTTP adapter
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Background task intervals (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Response-cache expiry sweep
    #[serde(default = "default_response_sweep_secs")]
    pub response_sweep_secs: u64,

    /// Typed-cache expiry sweep
    #[serde(default = "default_typed_sweep_secs")]
    pub typed_sweep_secs: u64,

    /// Connectivity probe used by `run` to detect reconnects
    #[serde(default = "default_probe_secs")]
    pub connectivity_probe_secs: u64,
}

fn default_response_sweep_secs() -> u64 {
    24 * 60 * 60
}

fn default_typed_sweep_secs() -> u64 {
    30 * 60
}

fn default_probe_secs() -> u64 {
    30
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            response_sweep_secs: default_response_sweep_secs(),
            typed_sweep_secs: default_typed_sweep_secs(),
            connectivity_probe_secs: default_probe_secs(),
        }
    }
}

/// Preload behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadSettings {
    /// Preload critical data when `run` starts online
    #[serde(default = "default_true")]
    pub on_start: bool,

    /// Delay before preloading after connectivity returns
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            on_start: true,
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_cache_name() -> String {
    DEFAULT_CACHE_NAME.to_string()
}

fn default_offline_url() -> String {
    DEFAULT_OFFLINE_URL.to_string()
}

fn default_cdn_hosts() -> Vec<String> {
    DEFAULT_CDN_HOSTS.iter().map(|h| h.to_string()).collect()
}

fn default_precache() -> Vec<String> {
    DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cache_name: default_cache_name(),
            offline_url: default_offline_url(),
            cdn_hosts: default_cdn_hosts(),
            precache: default_precache(),
            store: StoreSettings::default(),
            network: NetworkSettings::default(),
            schedule: ScheduleSettings::default(),
            preload: PreloadSettings::default(),
        }
    }
}

impl Config {
    /// Get the default config file path (~/.frcpm-offline/config.yaml)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".frcpm-offline").join("config.yaml"))
    }

    /// Load configuration from an explicit path, or the default location.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load_at(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(Path::new(p)),
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    log::debug!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()).into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(path, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Check that the origin parses, the cache name is usable and no
    /// schedule interval is zero
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid(format!("origin '{}': {}", self.origin, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "origin '{}' must be http or https",
                self.origin
            ))
            .into());
        }
        if self.cache_name.trim().is_empty() {
            return Err(ConfigError::Invalid("cache_name must not be empty".to_string()).into());
        }
        for (name, secs) in [
            ("schedule.response_sweep_secs", self.schedule.response_sweep_secs),
            ("schedule.typed_sweep_secs", self.schedule.typed_sweep_secs),
            ("schedule.connectivity_probe_secs", self.schedule.connectivity_probe_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)).into());
            }
        }
        Ok(())
    }

    /// Parsed application origin
    pub fn origin_url(&self) -> Result<reqwest::Url> {
        reqwest::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid(format!("origin '{}': {}", self.origin, e)).into())
    }

    /// Resolve the data directory (~/.cache/frcpm-offline on Linux)
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.store
            .data_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("frcpm-offline")))
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }

    pub fn response_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.response_sweep_secs)
    }

    pub fn typed_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.typed_sweep_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.connectivity_probe_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.preload.reconnect_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.origin, "http://localhost:8080");
        assert!(config.cache_name.starts_with("frc-pm-v"));
        assert_eq!(config.offline_url, "/offline.html");
        assert_eq!(config.precache.len(), 9);
        assert_eq!(config.cdn_hosts.len(), 5);
        assert_eq!(config.store.backend, StoreBackendChoice::Auto);
        assert_eq!(config.schedule.response_sweep_secs, 86_400);
        assert_eq!(config.schedule.typed_sweep_secs, 1_800);
        assert_eq!(config.preload.reconnect_delay_secs, 5);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "origin: https://pm.team1234.org\nstore:\n  backend: bounded\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.origin, "https://pm.team1234.org");
        assert_eq!(config.store.backend, StoreBackendChoice::Bounded);
        assert_eq!(config.offline_url, "/offline.html");
        assert_eq!(config.network.timeout_secs, 30);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let err = Config::load_at(Some("/nonexistent/frcpm/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = Config {
            origin: "ftp://example.com".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.schedule.typed_sweep_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("typed_sweep_secs"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let config = Config {
            cache_name: "frc-pm-v9".to_string(),
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.cache_name, "frc-pm-v9");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
