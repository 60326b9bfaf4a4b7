//! Log sink setup
//!
//! Journald when the journal socket is present, stdout otherwise. An optional
//! log file receives a plain-text copy of every line.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use sf_core::constants::paths;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "SOCFAN_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Journald,
    Stdout,
}

impl std::fmt::Display for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogSink::Journald => write!(f, "journald"),
            LogSink::Stdout => write!(f, "stdout"),
        }
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging(log_file: Option<&Path>) -> LogSink {
    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    let journald = if Path::new(paths::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
                None
            }
        }
    } else {
        None
    };
    let sink = if journald.is_some() {
        LogSink::Journald
    } else {
        LogSink::Stdout
    };

    let stdout = journald
        .is_none()
        .then(|| fmt::layer().with_target(false).with_level(true));

    let file = log_file.and_then(open_log_file).map(|f| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(f))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::new(&log_level))
        .with(journald)
        .with(stdout)
        .with(file)
        .init();

    sink
}

fn open_log_file(path: &Path) -> Option<File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {} - continuing without it", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_appends() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("socfand.log");
        std::fs::write(&path, "first\n").unwrap();

        {
            use std::io::Write;
            let mut f = open_log_file(&path).unwrap();
            writeln!(f, "second").unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_open_log_file_missing_dir() {
        assert!(open_log_file(Path::new("/nonexistent/socfan/socfand.log")).is_none());
    }
}
