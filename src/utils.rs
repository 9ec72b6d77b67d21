use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use log::{LevelFilter, Metadata, Record};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

// Logging setup and small formatting helpers for the command line front end.

/// Writes `HH:MM:SS.mmm LEVEL target: message` lines to a file, or to stderr
/// since stdout carries the rendered timeline
pub struct SimpleLogger {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl SimpleLogger {
    pub fn new(log_file_path: Option<&str>) -> Result<Self> {
        let sink: Box<dyn Write + Send> = match log_file_path {
            Some(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
            None => Box::new(io::stderr()),
        };
        Ok(SimpleLogger { sink: Mutex::new(sink) })
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} {:<5} {}: {}\n",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = sink.write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = self.sink.lock().unwrap_or_else(PoisonError::into_inner).flush();
    }
}

/// Install the logger at `level`. The level can be tightened later with
/// `log::set_max_level` once the config is known.
pub fn setup_logging(log_file: Option<&str>, level: LevelFilter) -> Result<()> {
    let logger = SimpleLogger::new(log_file)?;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    log::debug!("chatline {} logging to {}", env!("CARGO_PKG_VERSION"), log_file.unwrap_or("stderr"));
    Ok(())
}

/// Local-time rendering of `timestamp`; falls back to RFC 3339 on a bad format string
pub fn format_timestamp(timestamp: DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", timestamp.with_timezone(&Local).format(format)).is_err() {
        return timestamp.to_rfc3339();
    }
    out
}

/// Accepts 1/0, true/false, yes/no, on/off
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
