//! Diagnostic logging for the library and the CLI
//!
//! Everything goes to stderr; stdout belongs to command output (text or the
//! JSON report). The filter comes from `RUST_LOG` when set, otherwise from
//! `TRICAST_LOG_LEVEL`, otherwise `warn`.
//!
//! ```no_run
//! use libtricast::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "libtricast=debug".to_string(), false).init();
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

const FORMAT_VAR: &str = "TRICAST_LOG_FORMAT";
const LEVEL_VAR: &str = "TRICAST_LOG_LEVEL";
const DEFAULT_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain lines, safe to pipe
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
    /// Multi-line with source locations
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [LogFormat::Text, LogFormat::Json, LogFormat::Pretty]
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Invalid log format: '{}'. Valid options: text, json, pretty",
                    s
                )
            })
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive, e.g. `info` or `libtricast=trace`
    pub level: String,
    /// Forces `debug` regardless of `level`
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Read `TRICAST_LOG_FORMAT` and `TRICAST_LOG_LEVEL`
    ///
    /// An unparseable format falls back to text rather than failing startup.
    pub fn from_env(verbose: bool) -> Self {
        let format = std::env::var(FORMAT_VAR)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();
        let level = std::env::var(LEVEL_VAR).unwrap_or_else(|_| DEFAULT_LEVEL.to_string());

        Self::new(format, level, verbose)
    }

    fn filter_directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.filter_directive()))
    }

    /// Install the global subscriber
    ///
    /// Returns false when one was already installed (tests, embedding callers).
    pub fn init(&self) -> bool {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Text => builder.with_target(false).try_init(),
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .try_init(),
        };

        installed.is_ok()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(LogFormat::Text, DEFAULT_LEVEL.to_string(), false)
    }
}

/// Environment-driven setup for callers without their own flags
pub fn init_default() -> bool {
    LoggingConfig::from_env(false).init()
}
