use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};

use dailylog::config::{self, LoggingConfig};
use dailylog::logging::Logger;

fn main() -> Result<()> {
    // Optional first argument overrides ~/.dailylog/config.toml
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_file_path);
    let config = LoggingConfig::load_from(&config_path)?;

    let logger = Logger::init(config.logger_options());
    logger.install()?;

    tracing::info!("Logging to: {}", logger.directory().display());

    // Every stdin line becomes one record
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if !line.trim().is_empty() {
            logger.info(line);
        }
    }

    logger.close()
}
