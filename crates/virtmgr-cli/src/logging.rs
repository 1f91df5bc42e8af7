//! Tracing subscriber setup

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use clap::ValueEnum;
use color_eyre::Result;
use eyre::{WrapErr, eyre};
use tracing_subscriber::EnvFilter;

/// Console and file log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Filter directive for the level; `critical` maps to `error`
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Install the global subscriber
///
/// A log file replaces console output and is always timestamped.
///
/// # Errors
/// Returns error if the log file cannot be created or a subscriber is
/// already installed
pub fn init(level: LogLevel, timestamps: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::new(level.directive());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match log_file {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("cannot create log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None if timestamps => builder.with_writer(std::io::stderr).try_init(),
        None => builder.with_writer(std::io::stderr).without_time().try_init(),
    };

    installed.map_err(|e| eyre!("cannot install log subscriber: {e}"))
}
