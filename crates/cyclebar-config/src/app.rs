//! Application-wide configuration settings

use serde::{Deserialize, Serialize};

/// Application-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name for logging and identification
    pub name: String,

    /// Global log level, used when `RUST_LOG` is unset
    pub log_level: LogLevel,

    /// Number of worker threads for parallel symbol runs
    pub worker_threads: Option<usize>,

    /// Stop scheduling new symbols after the first failure
    pub fail_fast: bool,

    /// Enable debug mode with additional logging
    pub debug_mode: bool,
}

/// Log level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "cyclebar".to_string(),
            log_level: LogLevel::Info,
            worker_threads: None, // Auto-detect from system
            fail_fast: false,
            debug_mode: false,
        }
    }
}

impl AppConfig {
    /// Get the number of worker threads, auto-detecting if not specified
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
            .filter(|&n| n > 0)
            .unwrap_or_else(num_cpus::get)
    }

    /// Check if running in debug mode
    pub fn is_debug(&self) -> bool {
        self.debug_mode || matches!(self.log_level, LogLevel::Debug | LogLevel::Trace)
    }

    /// Effective log directive, debug mode forcing at least `debug`
    pub fn log_directive(&self) -> &'static str {
        if self.debug_mode && !self.is_verbose_level() {
            LogLevel::Debug.as_directive()
        } else {
            self.log_level.as_directive()
        }
    }

    fn is_verbose_level(&self) -> bool {
        matches!(self.log_level, LogLevel::Debug | LogLevel::Trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_threads_auto_detect() {
        let config = AppConfig::default();
        let threads = config.worker_threads();

        assert!(threads > 0);
        assert!(threads <= 1024);

        let pinned = AppConfig {
            worker_threads: Some(3),
            ..AppConfig::default()
        };
        assert_eq!(pinned.worker_threads(), 3);
    }

    #[test]
    fn test_debug_mode_detection() {
        let mut config = AppConfig::default();
        assert!(!config.is_debug());
        assert_eq!(config.log_directive(), "info");

        config.debug_mode = true;
        assert!(config.is_debug());
        assert_eq!(config.log_directive(), "debug");

        config.debug_mode = false;
        config.log_level = LogLevel::Trace;
        assert!(config.is_debug());
        assert_eq!(config.log_directive(), "trace");
    }
}
