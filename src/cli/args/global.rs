//! Global CLI options shared across all commands

use crate::cli::{Cli, OutputFormat};

/// Global CLI options passed to all command handlers.
///
/// Precedence is CLI flag > environment variable > config file > default.
/// This struct captures the CLI/env layer; the config file is applied in
/// `CommandContext`.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Output format (pretty, table, json)
    pub format: OutputFormat,

    /// Custom config file path (defaults to ~/.frcpm-offline/config.yaml)
    pub config: Option<String>,

    /// Application origin override
    pub origin: Option<String>,
}

impl GlobalOptions {
    /// Create GlobalOptions from a parsed CLI struct
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            config: cli.config.clone(),
            origin: cli.origin.clone(),
        }
    }

    pub fn config_ref(&self) -> Option<&str> {
        self.config.as_deref()
    }

    pub fn origin_ref(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}
