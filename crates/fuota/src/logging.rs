// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! File-backed logging for the server binaries.
//!
//! All library code logs through the `log` facade. [`init`] installs the
//! backend: a date-stamped file under `<directory>/Update-Logs/`, with an
//! optional mirror to stdout for interactive runs. The file is appended to,
//! so several runs on the same day share one log.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

/// Subdirectory created below the configured log path.
const LOG_SUBDIR: &str = "Update-Logs";

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory under which `Update-Logs/` is created.
    pub directory: PathBuf,
    /// Mirror every record to stdout as well.
    pub terminal: bool,
    /// Minimum level written to any output.
    pub level: LevelFilter,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            terminal: false,
            level: LevelFilter::Info,
        }
    }
}

/// Errors raised while installing the logging backend.
#[derive(Debug)]
pub enum LogInitError {
    /// Creating the log directory or file failed.
    Io(io::Error),
    /// A logger was installed already.
    AlreadyInitialized,
}

impl std::fmt::Display for LogInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot open log file: {}", e),
            Self::AlreadyInitialized => write!(f, "logger already initialized"),
        }
    }
}

impl std::error::Error for LogInitError {}

impl From<io::Error> for LogInitError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

struct FileLogger {
    file: Mutex<File>,
    terminal: bool,
    level: LevelFilter,
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} :: {:<5} :: {:<20} :: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        );
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
        }
        if self.terminal {
            println!("{}", line);
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Path of today's log file below `directory`.
pub fn log_file_path(directory: &Path) -> PathBuf {
    // Historical file naming: year, day, month.
    directory
        .join(LOG_SUBDIR)
        .join(format!("{}.log", Local::now().format("%Y%d%m")))
}

/// Install the file logger. Call once, before any other work.
pub fn init(options: &LogOptions) -> Result<(), LogInitError> {
    let path = log_file_path(&options.directory);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let logger = FileLogger {
        file: Mutex::new(file),
        terminal: options.terminal,
        level: options.level,
    };
    log::set_boxed_logger(Box::new(logger)).map_err(|_| LogInitError::AlreadyInitialized)?;
    log::set_max_level(options.level);
    Ok(())
}
