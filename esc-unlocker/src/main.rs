mod cmd;

use std::{path::PathBuf, process};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use time::UtcOffset;

use esc_unlocker::{
    config::Config,
    logging::{setup_logging, LevelFilter},
};

#[derive(clap::Parser)]
#[clap(
    name = "esc-unlocker",
    about = "Unlock or lock the flash of AM32 ESCs through OpenOCD",
    version = env!("ESC_UNLOCKER_VERSION"),
    long_version = env!("ESC_UNLOCKER_LONG_VERSION")
)]
struct Cli {
    /// Location for a JSON log file of the tool's own diagnostics
    #[clap(long, global = true, help_heading = "LOG CONFIGURATION")]
    log_file: Option<PathBuf>,
    /// Log level for diagnostics. Overrides `RUST_LOG` and the configuration file.
    #[clap(
        long,
        global = true,
        value_enum,
        ignore_case = true,
        help_heading = "LOG CONFIGURATION"
    )]
    log_level: Option<LevelFilter>,
    /// An additional configuration file (.toml, .json, .yaml or .yml)
    #[clap(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Launch OpenOCD repeatedly until the operation succeeds
    Run(cmd::run::Cmd),
    /// List the supported MCUs, pins and modes, and the bundled files present
    List(cmd::list::Cmd),
}

fn main() {
    // Determine the local offset as early as possible to avoid potential
    // issues with multiple threads and getting the offset.
    let utc_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    match main_try(utc_offset) {
        Ok(true) => (),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{}: {:?}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

/// Returns whether the command achieved what it was asked to do.
fn main_try(utc_offset: UtcOffset) -> Result<bool> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration.")?;

    let _logger_guard = setup_logging(cli.log_file.as_deref(), cli.log_level.or(config.log_level))
        .context("Failed to set up logging.")?;

    match cli.subcommand {
        Subcommand::Run(cmd) => cmd.run(&config, utc_offset),
        Subcommand::List(cmd) => cmd.run(&config).map(|()| true),
    }
}
