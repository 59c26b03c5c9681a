/// Stdout and rotating file logging for binaries.
pub mod logger_fern;

pub use logger_fern::{parse_level, rotate_logs, setup_logging, LoggerError};
