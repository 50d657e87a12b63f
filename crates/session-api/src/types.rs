//! Core identifiers and enumerations shared by every session kind
//!
//! These types form the public vocabulary of the session API: identifiers that
//! stay stable for a logical session's lifetime, the public state machine, and
//! the reason codes that qualify terminal states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, ServiceError};

/// Session identifier
///
/// Opaque and unique within a session kind. Assigned by the protocol engine
/// when the session is created (outbound) or when an invitation arrives
/// (inbound), and kept after the live session disappears.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Parse an identifier supplied by an API caller
    pub fn parse(value: &str) -> Result<Self> {
        if value.trim().is_empty() {
            return Err(ServiceError::validation("session id must not be null or empty"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Remote party of a session
///
/// Either a phone number (optionally prefixed with `+`) or a `sip:`/`tel:` URI.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ContactId(String);

impl ContactId {
    /// Validate and normalise a contact string
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::validation("contact must not be null or empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ServiceError::validation(format!(
                "contact '{}' must not contain whitespace",
                trimmed
            )));
        }
        if trimmed.starts_with("sip:") || trimmed.starts_with("tel:") {
            return Ok(Self(trimmed.to_string()));
        }
        let (prefix, number) = match trimmed.strip_prefix('+') {
            Some(rest) => ("+", rest),
            None => ("", trimmed),
        };
        let digits = number.replace('-', "");
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ServiceError::validation(format!(
                "contact '{}' is neither a phone number nor a sip/tel uri",
                trimmed
            )));
        }
        Ok(Self(format!("{}{}", prefix, digits)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of session behind a facade
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SessionKind {
    ImageSharing,
    VideoSharing,
    GeolocSharing,
    MultimediaMessaging,
    MultimediaStreaming,
    FileUpload,
}

impl SessionKind {
    /// Content sharing kinds report failures with sharing-specific reason codes
    pub fn is_sharing(&self) -> bool {
        matches!(
            self,
            SessionKind::ImageSharing | SessionKind::VideoSharing | SessionKind::GeolocSharing
        )
    }

    /// Multimedia kinds are extension sessions guarded by a service id
    pub fn is_multimedia(&self) -> bool {
        matches!(
            self,
            SessionKind::MultimediaMessaging | SessionKind::MultimediaStreaming
        )
    }

    /// Whether the kind can ever reach `Transferred`
    pub fn has_transfer(&self) -> bool {
        !self.is_multimedia()
    }

    /// Short name used for worker and log labels
    pub fn name(&self) -> &'static str {
        match self {
            SessionKind::ImageSharing => "image-sharing",
            SessionKind::VideoSharing => "video-sharing",
            SessionKind::GeolocSharing => "geoloc-sharing",
            SessionKind::MultimediaMessaging => "multimedia-messaging",
            SessionKind::MultimediaStreaming => "multimedia-streaming",
            SessionKind::FileUpload => "file-upload",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Public session state
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SessionState {
    Invited,
    Initiating,
    Started,
    Aborted,
    Failed,
    Transferred,
    Rejected,
    Ringing,
    Accepting,
}

impl SessionState {
    /// No further transition is expected from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Transferred
                | SessionState::Rejected
                | SessionState::Aborted
                | SessionState::Failed
        )
    }

    /// Integer value exposed to API consumers
    pub fn to_int(&self) -> i32 {
        match self {
            SessionState::Invited => 0,
            SessionState::Initiating => 1,
            SessionState::Started => 2,
            SessionState::Aborted => 3,
            SessionState::Failed => 4,
            SessionState::Transferred => 5,
            SessionState::Rejected => 6,
            SessionState::Ringing => 7,
            SessionState::Accepting => 8,
        }
    }

    pub fn from_int(value: i32) -> Result<Self> {
        Ok(match value {
            0 => SessionState::Invited,
            1 => SessionState::Initiating,
            2 => SessionState::Started,
            3 => SessionState::Aborted,
            4 => SessionState::Failed,
            5 => SessionState::Transferred,
            6 => SessionState::Rejected,
            7 => SessionState::Ringing,
            8 => SessionState::Accepting,
            other => {
                return Err(ServiceError::validation(format!("no session state with value {}", other)))
            }
        })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Cause qualifying a rejected, aborted or failed state
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReasonCode {
    Unspecified,
    AbortedByUser,
    AbortedByRemote,
    AbortedBySystem,
    AbortedByInactivity,
    RejectedByUser,
    RejectedByRemote,
    RejectedBySystem,
    RejectedByTimeout,
    RejectedLowSpace,
    RejectedMaxSize,
    RejectedSpam,
    FailedInitiation,
    FailedSharing,
    FailedSaving,
    FailedMedia,
    FailedSession,
}

impl Default for ReasonCode {
    fn default() -> Self {
        ReasonCode::Unspecified
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Direction of a session relative to the local user
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Extension service identifier owning a multimedia session
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn parse(value: &str) -> Result<Self> {
        if value.trim().is_empty() {
            return Err(ServiceError::validation("service id must not be null or empty"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Description of the content carried by a sharing or upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    /// Location of the content (file uri, geoloc payload uri, ...)
    pub uri: String,
    /// Display file name
    pub name: String,
    /// MIME type
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
}

impl ContentInfo {
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(ServiceError::validation("content uri must not be null or empty"));
        }
        Ok(())
    }
}

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_parsing() {
        assert_eq!(ContactId::parse("+33 6").is_err(), true);
        assert_eq!(ContactId::parse("+33-612-345").unwrap().as_str(), "+33612345");
        assert_eq!(ContactId::parse("sip:bob@example.com").unwrap().as_str(), "sip:bob@example.com");
        assert!(ContactId::parse("").is_err());
        assert!(ContactId::parse("bob").is_err());
        assert!(ContactId::parse("+-").is_err());
        assert!(ContactId::parse("---").is_err());
        assert!(ContactId::parse("++33").is_err());
    }

    #[test]
    fn test_state_int_values() {
        for value in 0..=8 {
            assert_eq!(SessionState::from_int(value).unwrap().to_int(), value);
        }
        assert!(SessionState::from_int(9).is_err());
        assert_eq!(SessionState::Transferred.to_int(), 5);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Transferred.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Started.is_terminal());
        assert!(!SessionState::Invited.is_terminal());
    }

    #[test]
    fn test_session_id_parse() {
        assert!(SessionId::parse("  ").is_err());
        assert_eq!(SessionId::parse("abc").unwrap(), SessionId::from("abc"));
        assert_ne!(SessionId::new(), SessionId::new());
    }
}
