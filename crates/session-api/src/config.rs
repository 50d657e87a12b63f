//! Service configuration
//!
//! A single [`ServiceConfig`] is passed to every service constructor. It can be
//! built in code with the `with_*` methods or loaded from TOML:
//!
//! ```toml
//! queue_capacity = 32
//! dispatch_timeout_ms = 2000
//! max_message_size = 65536
//! allowed_service_ids = ["ext.game", "ext.whiteboard"]
//! auto_accept = true
//! auto_accept_changeable = false
//!
//! [logging]
//! level = "debug"
//! json = true
//! ```
//!
//! Missing keys take their default values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::{AllowAll, AuthorizationCheck, ServiceAllowList};
use crate::errors::{Result, ServiceError};
use crate::events::DEFAULT_DISPATCH_TIMEOUT;
use crate::logging::{parse_log_level, LoggingConfig};
use crate::scheduler::DEFAULT_QUEUE_CAPACITY;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bounded queue size of each operation scheduler
    pub queue_capacity: usize,

    /// Time one listener may spend on one event before it is dropped
    pub dispatch_timeout_ms: u64,

    /// Payload limit applied when a live session reports none (0 = unlimited)
    pub max_message_size: usize,

    /// Extension service ids allowed to drive multimedia sessions; empty allows all
    pub allowed_service_ids: Vec<String>,

    /// Accept incoming content automatically
    pub auto_accept: bool,

    /// Accept incoming content automatically while roaming
    pub auto_accept_in_roaming: bool,

    /// Whether API clients may change the two auto-accept settings
    pub auto_accept_changeable: bool,

    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dispatch_timeout_ms: DEFAULT_DISPATCH_TIMEOUT.as_millis() as u64,
            max_message_size: 0,
            allowed_service_ids: Vec::new(),
            auto_accept: false,
            auto_accept_in_roaming: false,
            auto_accept_changeable: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_allowed_service(mut self, service_id: impl Into<String>) -> Self {
        self.allowed_service_ids.push(service_id.into());
        self
    }

    pub fn with_auto_accept(mut self, enabled: bool, in_roaming: bool) -> Self {
        self.auto_accept = enabled;
        self.auto_accept_in_roaming = in_roaming;
        self
    }

    pub fn with_auto_accept_changeable(mut self, changeable: bool) -> Self {
        self.auto_accept_changeable = changeable;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Authorization policy implied by `allowed_service_ids`
    pub fn authorization(&self) -> Arc<dyn AuthorizationCheck> {
        if self.allowed_service_ids.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(ServiceAllowList::new(self.allowed_service_ids.iter().cloned()))
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| ServiceError::validation(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::validation(format!("cannot read configuration {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ServiceError::validation("queue_capacity must be at least 1"));
        }
        if self.dispatch_timeout_ms == 0 {
            return Err(ServiceError::validation("dispatch_timeout_ms must be positive"));
        }
        if self.auto_accept_in_roaming && !self.auto_accept {
            return Err(ServiceError::validation(
                "auto_accept_in_roaming requires auto_accept",
            ));
        }
        if self.allowed_service_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ServiceError::validation("allowed_service_ids must not contain empty ids"));
        }
        parse_log_level(&self.logging.level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        config.validate().unwrap();
        assert_eq!(config.dispatch_timeout(), DEFAULT_DISPATCH_TIMEOUT);
    }

    #[test]
    fn test_partial_toml() {
        let config = ServiceConfig::from_toml_str(
            r#"
            queue_capacity = 8
            allowed_service_ids = ["ext.game"]

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.allowed_service_ids, vec!["ext.game".to_string()]);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.max_message_size, 0);
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServiceConfig::from_toml_str("queue_capacity = 0").is_err());
        assert!(ServiceConfig::from_toml_str("auto_accept_in_roaming = true").is_err());
        assert!(ServiceConfig::from_toml_str("queue_capacity = \"many\"").is_err());
        assert!(ServiceConfig::new()
            .with_logging(LoggingConfig::new("chatty", "x"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_message_size = 1024\nauto_accept = true").unwrap();
        let config = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_message_size, 1024);
        assert!(config.auto_accept);

        assert!(ServiceConfig::from_file("/nonexistent/session-api.toml").is_err());
    }
}
