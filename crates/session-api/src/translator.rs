//! Protocol code translation
//!
//! Maps the termination reasons and numeric error codes raised by the protocol
//! engine onto the public `(SessionState, ReasonCode)` pair. The mapping is
//! total over the known code domain; anything outside it is reported as
//! [`ServiceError::Internal`], never silently defaulted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, ServiceError};
use crate::types::{ReasonCode, SessionKind, SessionState};

/// Numeric error codes raised by the protocol engine
pub mod error_codes {
    pub const SESSION_INITIATION_FAILED: i32 = 101;
    pub const SESSION_INITIATION_CANCELLED: i32 = 102;
    pub const SESSION_INITIATION_DECLINED: i32 = 103;
    pub const SEND_RESPONSE_FAILED: i32 = 104;
    pub const MEDIA_FAILED: i32 = 105;
    pub const UNEXPECTED_EXCEPTION: i32 = 106;

    pub const MEDIA_SAVING_FAILED: i32 = 121;
    pub const MEDIA_TRANSFER_FAILED: i32 = 122;
    pub const MEDIA_STREAMING_FAILED: i32 = 123;
    pub const UNSUPPORTED_MEDIA_TYPE: i32 = 124;
    pub const NOT_ENOUGH_STORAGE_SPACE: i32 = 125;
    pub const MEDIA_SIZE_TOO_BIG: i32 = 126;

    /// Every code the engine is known to raise
    pub const KNOWN: &[i32] = &[
        SESSION_INITIATION_FAILED,
        SESSION_INITIATION_CANCELLED,
        SESSION_INITIATION_DECLINED,
        SEND_RESPONSE_FAILED,
        MEDIA_FAILED,
        UNEXPECTED_EXCEPTION,
        MEDIA_SAVING_FAILED,
        MEDIA_TRANSFER_FAILED,
        MEDIA_STREAMING_FAILED,
        UNSUPPORTED_MEDIA_TYPE,
        NOT_ENOUGH_STORAGE_SPACE,
        MEDIA_SIZE_TOO_BIG,
    ];
}

/// Why the engine terminated (or refused) a session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TerminationReason {
    BySystem,
    ByUser,
    ByTimeout,
    ByInactivity,
    ConnectionLost,
    LowBattery,
    ByRemote,
}

/// Low-level code delivered with an abort, rejection or error event
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum ProtocolCode {
    Aborted(TerminationReason),
    Rejected(TerminationReason),
    Error(i32),
}

impl fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolCode::Aborted(reason) => write!(f, "aborted({:?})", reason),
            ProtocolCode::Rejected(reason) => write!(f, "rejected({:?})", reason),
            ProtocolCode::Error(code) => write!(f, "error({})", code),
        }
    }
}

/// Public state paired with the reason that qualifies it
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateAndReason {
    pub state: SessionState,
    pub reason: ReasonCode,
}

impl StateAndReason {
    pub fn new(state: SessionState, reason: ReasonCode) -> Self {
        Self { state, reason }
    }

    pub fn unspecified(state: SessionState) -> Self {
        Self::new(state, ReasonCode::Unspecified)
    }
}

/// Translate a protocol code for a session of `kind`
pub fn translate(kind: SessionKind, code: ProtocolCode) -> Result<StateAndReason> {
    let mapped = match code {
        ProtocolCode::Aborted(reason) => aborted(kind, reason),
        ProtocolCode::Rejected(reason) => rejected(reason),
        ProtocolCode::Error(value) => error(kind, value),
    };
    mapped.ok_or_else(|| {
        ServiceError::internal(format!("unknown protocol code {} for {} session", code, kind))
    })
}

fn aborted(kind: SessionKind, reason: TerminationReason) -> Option<StateAndReason> {
    use ReasonCode::*;
    use SessionState::*;

    Some(match reason {
        TerminationReason::BySystem | TerminationReason::ByTimeout => {
            StateAndReason::new(Aborted, AbortedBySystem)
        }
        TerminationReason::ByUser => StateAndReason::new(Aborted, AbortedByUser),
        TerminationReason::ByRemote => StateAndReason::new(Aborted, AbortedByRemote),
        TerminationReason::ConnectionLost if kind.is_multimedia() => {
            StateAndReason::new(Failed, FailedSession)
        }
        TerminationReason::ConnectionLost => StateAndReason::new(Failed, FailedSharing),
        TerminationReason::ByInactivity if kind.is_multimedia() => {
            StateAndReason::new(Aborted, AbortedByInactivity)
        }
        TerminationReason::ByInactivity | TerminationReason::LowBattery => return None,
    })
}

fn rejected(reason: TerminationReason) -> Option<StateAndReason> {
    use ReasonCode::*;

    let code = match reason {
        TerminationReason::ByUser => RejectedByUser,
        TerminationReason::BySystem | TerminationReason::ConnectionLost => RejectedBySystem,
        TerminationReason::ByTimeout | TerminationReason::ByInactivity => RejectedByTimeout,
        TerminationReason::ByRemote => RejectedByRemote,
        TerminationReason::LowBattery => return None,
    };
    Some(StateAndReason::new(SessionState::Rejected, code))
}

fn error(kind: SessionKind, code: i32) -> Option<StateAndReason> {
    use error_codes::*;
    use ReasonCode::*;
    use SessionState::*;

    if kind.is_multimedia() {
        return Some(match code {
            SESSION_INITIATION_DECLINED => StateAndReason::new(Rejected, RejectedByRemote),
            MEDIA_FAILED => StateAndReason::new(Failed, FailedMedia),
            SESSION_INITIATION_CANCELLED | SESSION_INITIATION_FAILED => {
                StateAndReason::new(Failed, FailedInitiation)
            }
            other if KNOWN.contains(&other) => StateAndReason::new(Failed, FailedSession),
            _ => return None,
        });
    }

    Some(match code {
        SESSION_INITIATION_FAILED | SEND_RESPONSE_FAILED => {
            StateAndReason::new(Failed, FailedInitiation)
        }
        SESSION_INITIATION_CANCELLED | SESSION_INITIATION_DECLINED => {
            StateAndReason::new(Rejected, RejectedByRemote)
        }
        MEDIA_SAVING_FAILED => StateAndReason::new(Failed, FailedSaving),
        MEDIA_TRANSFER_FAILED | MEDIA_STREAMING_FAILED | UNSUPPORTED_MEDIA_TYPE => {
            StateAndReason::new(Failed, FailedSharing)
        }
        NOT_ENOUGH_STORAGE_SPACE => StateAndReason::new(Rejected, RejectedLowSpace),
        MEDIA_SIZE_TOO_BIG => StateAndReason::new(Rejected, RejectedMaxSize),
        _ => return None,
    })
}
