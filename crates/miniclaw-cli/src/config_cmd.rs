//! `miniclaw config` — write the starter configuration.

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use miniclaw_core::config::create_default_config;
use miniclaw_core::ConfigError;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a default config.yaml (never overwrites)
    Init {
        /// Where to write it (defaults to ~/.miniclaw/config.yaml)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub fn dispatch(cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Init { path } => init(path),
    }
}

fn init(path: Option<PathBuf>) -> Result<()> {
    match create_default_config(path.as_deref()) {
        Ok(written) => {
            println!("  {} created config at {}", "✓".green(), written.display());
            println!(
                "{}",
                "  Set ANTHROPIC_API_KEY and OPENAI_API_KEY, or edit the file.".dimmed()
            );
            Ok(())
        }
        Err(ConfigError::AlreadyExists(existing)) => {
            println!(
                "  {} config already exists at {}",
                "✓".green(),
                existing.display()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
