//! Error types for the session API

use thiserror::Error;

/// Result type for session API operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced synchronously to API callers
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Null, empty or malformed argument
    #[error("Invalid argument: {message}")]
    Validation { message: String },

    /// No live session (or no registered service) to act upon
    #[error("Not available: {message}")]
    NotAvailable { message: String },

    /// Authorization check failed
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Payload exceeds the session's maximum message size
    #[error("Payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// Data could not be handed to the session
    #[error("Send failed: {message}")]
    SendFailed { message: String },

    /// Operation not supported in the current mode or direction
    #[error("Unsupported operation: {message}")]
    UnsupportedOperation { message: String },

    /// A facade is already registered for this session id
    #[error("Session already exists: {session_id}")]
    AlreadyExists { session_id: String },

    /// Persisted record missing or unreadable
    #[error("Persistent storage error: {0}")]
    Storage(#[from] StoreError),

    /// Unexpected condition, including unmapped protocol codes
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn not_available(message: impl Into<String>) -> Self {
        Self::NotAvailable { message: message.into() }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied { message: message.into() }
    }

    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed { message: message.into() }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation { message: message.into() }
    }

    pub fn already_exists(session_id: impl Into<String>) -> Self {
        Self::AlreadyExists { session_id: session_id.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Expected caller errors are reported without an error-level log entry
    pub fn should_be_logged(&self) -> bool {
        matches!(self, ServiceError::Storage(_) | ServiceError::Internal { .. })
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotRegistered => ServiceError::not_available("service is not registered"),
            other => ServiceError::internal(other.to_string()),
        }
    }
}

/// Errors reported by the protocol engine
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Engine is not registered to the network")]
    NotRegistered,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("Engine error: {0}")]
    Other(String),
}

/// Errors reported by the persisted store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("No record for session {0}")]
    NotFound(String),

    #[error("Record for session {0} already exists")]
    Duplicate(String),

    #[error("Store backend failure: {0}")]
    Backend(String),
}

/// Errors reported by a listener on dispatch
#[derive(Debug, Clone, Error)]
pub enum ListenerError {
    /// The remote end of the listener is gone
    #[error("Listener disconnected")]
    Disconnected,

    #[error("Listener failed: {0}")]
    Failed(String),
}
