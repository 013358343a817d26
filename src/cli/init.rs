//! Init command implementation

use colored::Colorize;

use frcpm_offline::config::Config;
use frcpm_offline::error::{Error, Result};

use crate::cli::args::GlobalOptions;
use crate::cli::context::config_path;

/// Write a config file with defaults and the `--origin` override
pub fn run(opts: &GlobalOptions, force: bool) -> Result<()> {
    let path = config_path(opts)?;
    if path.exists() && !force {
        return Err(Error::Other(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let mut config = Config::default();
    if let Some(origin) = opts.origin_ref() {
        config.origin = origin.to_string();
    }
    config.validate()?;
    config.save_to(&path)?;

    println!("{} Wrote {}", "✓".green(), path.display().to_string().cyan());
    println!("  Origin: {}", config.origin);
    println!("  → Run 'frcpm-offline worker install' to precache the app shell");
    Ok(())
}
