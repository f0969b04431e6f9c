use std::env::consts::{ARCH, FAMILY, OS};
use std::path::PathBuf;

use anyhow::{Context, Error};
use clap::Parser;
use tracing::trace;

use vsco_downloader::config::AppConfig;
use vsco_downloader::logger::Logger;

use crate::cli::Args;
use crate::program::Program;

mod cli;
mod program;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    // Held until exit so buffered file output is flushed
    let _logger = Logger::init(&config.logging, &PathBuf::from(&config.paths.log_directory))
        .context("Failed to initialize logging")?;
    log_system_information();

    let program = Program::new(args, config)?;
    program.run().await
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
