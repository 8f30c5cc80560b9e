//! Logging Infrastructure
//!
//! `tracing` subscriber setup: human-readable stdout, or daily rolling files
//! when a log directory is configured.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Initialize the logger from `LOG_LEVEL` (default `info`) and `LOG_DIR`
pub fn init_logger_from_env() {
    let level = std::env::var("LOG_LEVEL").ok();
    let dir = std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty());
    init_logger_with_file(level.as_deref(), dir.as_deref());
}

/// Initialize the logger with optional file output
///
/// `RUST_LOG`, when set, takes precedence over `log_level`. Calling this
/// twice is harmless: the second subscriber is ignored.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    // Add file output if log_dir is provided
    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if std::fs::create_dir_all(log_path).is_ok() {
            let file_appender = tracing_appender::rolling::daily(log_path, "order-service");
            let _ = subscriber.with_ansi(false).with_writer(file_appender).try_init();
            return;
        }
        eprintln!("Log directory {} is not writable, logging to stdout", dir);
    }

    let _ = subscriber.try_init();
}
