//! Logging settings: output format, level override, rolling-file policy.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::defaults::{default_log_dir, default_log_filename};

/// How log output is produced. Stdout is always written; the rolling file
/// is opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory the rolling log files land in
    pub dir: String,
    /// Base name of the rolling log file
    pub filename: String,
    pub rotation: Rotation,
    /// Explicit level filter; `RUST_LOG` applies when unset
    pub level: Option<LogLevel>,
    /// Write a rolling file in addition to stdout
    pub enable_file_logging: bool,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            filename: default_log_filename(),
            rotation: Rotation::default(),
            level: None,
            enable_file_logging: false,
            format: LogFormat::default(),
        }
    }
}

/// Rolling-file rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    /// One file, appended forever
    Never,
}

/// Tracing level filter. Accepts the usual spellings plus the `warning`
/// and `err` aliases seen in hand-edited config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    #[serde(alias = "err")]
    Error,
}

impl LogLevel {
    /// The directive string handed to the env filter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering of each log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Machine-readable, one JSON object per line
    #[default]
    Json,
    /// Human-readable, ANSI color on stdout
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_aliases_parse() {
        let warn: LogLevel = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(warn, LogLevel::Warn);
        let error: LogLevel = serde_json::from_str("\"err\"").unwrap();
        assert_eq!(error, LogLevel::Error);
        assert!(serde_json::from_str::<LogLevel>("\"loud\"").is_err());
    }

    #[test]
    fn test_level_serializes_canonically() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), "\"warn\"");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_empty_object_yields_defaults() {
        let cfg: LoggingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.rotation, Rotation::Daily);
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(cfg.level.is_none());
        assert!(!cfg.enable_file_logging);
    }

    #[test]
    fn test_rotation_wire_values() {
        let hourly: Rotation = serde_json::from_str("\"hourly\"").unwrap();
        assert_eq!(hourly, Rotation::Hourly);
        assert_eq!(serde_json::to_string(&Rotation::Never).unwrap(), "\"never\"");
    }
}
