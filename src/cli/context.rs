//! Command execution context
//!
//! Loads configuration, applies global overrides and builds the offline
//! context every command works against.

use std::path::PathBuf;

use frcpm_offline::OfflineContext;
use frcpm_offline::config::{Config, StoreBackendChoice};
use frcpm_offline::error::Result;

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;

/// Context for command execution
pub struct CommandContext {
    /// Fully wired offline layer
    pub offline: OfflineContext,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load configuration and build the offline layer.
    ///
    /// # Errors
    /// Returns error if the config cannot be loaded or is invalid, or if
    /// storage cannot be opened.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = load_config(opts)?;
        let offline = OfflineContext::from_config(config)?;
        Ok(Self {
            offline,
            format: opts.format,
        })
    }

    pub fn config(&self) -> &Config {
        &self.offline.config
    }
}

/// Load the config file and apply the origin override
pub fn load_config(opts: &GlobalOptions) -> Result<Config> {
    let mut config = Config::load_at(opts.config_ref())?;
    if let Some(origin) = opts.origin_ref() {
        config.origin = origin.to_string();
    }
    config.validate()?;
    Ok(config)
}

/// Where the config file lives for these options
pub fn config_path(opts: &GlobalOptions) -> Result<PathBuf> {
    match opts.config_ref() {
        Some(path) => Ok(PathBuf::from(path)),
        None => Config::default_path(),
    }
}

/// Where persistent data lives, or `in memory` for the bounded backend
pub fn storage_location(config: &Config) -> String {
    match (config.store.backend, config.data_dir()) {
        (StoreBackendChoice::Bounded, _) | (_, None) => "in memory".to_string(),
        (_, Some(dir)) => dir.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_origin_override_wins_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "origin: http://pm.local:8080\n").unwrap();

        let opts = GlobalOptions {
            format: OutputFormat::Json,
            config: Some(path.to_string_lossy().to_string()),
            origin: Some("https://pm.team1234.org".to_string()),
        };
        let config = load_config(&opts).unwrap();
        assert_eq!(config.origin, "https://pm.team1234.org");
    }

    #[test]
    fn test_invalid_origin_override_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "{}\n").unwrap();

        let opts = GlobalOptions {
            format: OutputFormat::Pretty,
            config: Some(path.to_string_lossy().to_string()),
            origin: Some("not a url".to_string()),
        };
        assert!(load_config(&opts).is_err());
    }

    #[test]
    fn test_storage_location() {
        let mut config = Config::default();
        config.store.data_dir = Some(PathBuf::from("/var/lib/frcpm"));
        assert_eq!(storage_location(&config), "/var/lib/frcpm");

        config.store.backend = StoreBackendChoice::Bounded;
        assert_eq!(storage_location(&config), "in memory");
    }
}
