//! Logging setup for hosts embedding the session services

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{Result, ServiceError};

/// Configuration for the tracing subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive ("trace" .. "error")
    pub level: String,
    /// Emit JSON lines instead of the human readable format
    pub json: bool,
    /// Include file and line of the call site
    pub file_info: bool,
    /// Log span enter/exit
    pub log_spans: bool,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "rvoip-session-api".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Parse a level directive
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| ServiceError::validation(format!("invalid log level: {}", level)))
}

/// Install the global subscriber
///
/// `RUST_LOG` directives are honoured on top of the configured level. Fails if
/// a global subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let span_events = if config.log_spans { FmtSpan::ACTIVE } else { FmtSpan::NONE };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().with_writer(std::io::stdout).try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ServiceError::internal(format!("failed to install subscriber: {}", e)))?;

    tracing::info!("Starting {} v{}", config.app_name, crate::VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(ServiceError::Validation { .. })));
    }

    #[test]
    fn test_builders() {
        let config = LoggingConfig::new("trace", "demo").with_json().with_file_info();
        assert!(config.json && config.file_info && !config.log_spans);
        assert_eq!(config.app_name, "demo");
    }

    #[test]
    #[serial_test::serial]
    fn test_subscriber_installs_once() {
        let config = LoggingConfig::new("debug", "logging-test");
        assert!(setup_logging(&config).is_ok());
        assert!(matches!(setup_logging(&config), Err(ServiceError::Internal { .. })));
    }

    #[test]
    fn test_invalid_level_rejected_before_install() {
        let config = LoggingConfig::new("chatty", "logging-test");
        assert!(matches!(setup_logging(&config), Err(ServiceError::Validation { .. })));
    }
}
