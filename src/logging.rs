//! Logger initialization
//!
//! log4rs is configured from `logging.config_file`. When that file is absent
//! or unreadable, env_logger is used instead so the process still logs.

use crate::config::LoggingConfig;
use log::info;
use std::path::Path;

/// Which logger ended up installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerKind {
    Log4rs,
    EnvLogger,
    /// Another logger was already installed
    Existing,
}

pub fn init_logging(config: &LoggingConfig) -> LoggerKind {
    if Path::new(&config.config_file).exists() {
        match log4rs::init_file(&config.config_file, Default::default()) {
            Ok(()) => {
                info!("Logging configured from {}", config.config_file);
                return LoggerKind::Log4rs;
            }
            Err(e) => eprintln!("Failed to load {}: {}; falling back to env_logger", config.config_file, e),
        }
    }

    match env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init() {
        Ok(()) => LoggerKind::EnvLogger,
        Err(_) => LoggerKind::Existing,
    }
}
