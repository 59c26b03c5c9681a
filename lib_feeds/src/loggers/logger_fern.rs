//! Process-wide logging to stdout plus a timestamped file, built on `fern`.
//!
//! Every start opens `<app_name>-<timestamp>.log` in the log directory and
//! removes all but the newest previous file of the same application.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use glob::glob;
use log::LevelFilter;
use thiserror::Error;

/// Errors installing the logger.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// The log directory or file could not be created.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// A global logger is already installed.
    #[error("Logger already installed: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Maps a level name to a filter. Unknown names fall back to `info`.
pub fn parse_level(log_level: &str) -> LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" | "fatal" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Keeps the newest `<app_name>-*.log` in `log_dir` and deletes the rest.
/// Timestamps in the file names sort chronologically.
pub fn rotate_logs(app_name: &str, log_dir: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/{}-*.log", log_dir.display(), app_name);
    let mut log_files: Vec<PathBuf> = match glob(&pattern) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(e) => {
            eprintln!("Invalid log rotation pattern {}: {}", pattern, e);
            return Vec::new();
        }
    };

    log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    let mut removed = Vec::new();
    for old_file in log_files.into_iter().skip(1) {
        match fs::remove_file(&old_file) {
            Ok(()) => removed.push(old_file),
            Err(e) => eprintln!("Error deleting old log file {}: {}", old_file.display(), e),
        }
    }
    removed
}

/// Path of the log file a start at this moment would write to.
pub fn log_file_path(app_name: &str, log_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    log_dir.join(format!("{}-{}.log", app_name, timestamp))
}

/// Installs the global logger. Returns the path of the new log file.
pub fn setup_logging(app_name: &str, log_dir: &Path, log_level: &str) -> Result<PathBuf, LoggerError> {
    fs::create_dir_all(log_dir)?;
    rotate_logs(app_name, log_dir);

    let log_path = log_file_path(app_name, log_dir);
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn levels() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_level("fatal"), LevelFilter::Error);
        assert_eq!(parse_level("verbose"), LevelFilter::Info);
    }

    #[test]
    fn rotation_keeps_only_the_newest_file_of_the_app() {
        let dir = tempdir().unwrap();
        for name in [
            "server_monitors-20260101_000000.log",
            "server_monitors-20260102_000000.log",
            "server_monitors-20260103_000000.log",
            "other-20250101_000000.log",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let removed = rotate_logs("server_monitors", dir.path());
        assert_eq!(removed.len(), 2);
        assert!(dir.path().join("server_monitors-20260103_000000.log").exists());
        assert!(!dir.path().join("server_monitors-20260101_000000.log").exists());
        assert!(dir.path().join("other-20250101_000000.log").exists());
    }

    #[test]
    fn file_names_carry_the_app_name() {
        let path = log_file_path("server_monitors", Path::new("/tmp"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("server_monitors-"));
        assert!(name.ends_with(".log"));
    }
}
