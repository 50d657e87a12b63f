//! Interfaces to the protocol engine
//!
//! The engine owns live sessions exclusively. This crate only looks them up by
//! id, reads their current attributes, and asks them to act; a live session may
//! disappear between any two calls.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::errors::{EngineError, Result};
use crate::translator::TerminationReason;
use crate::types::{ContactId, ContentInfo, ServiceId, SessionId, SessionKind, SessionState};

/// An active session owned by the protocol engine
#[async_trait]
pub trait LiveSession: Send + Sync {
    fn session_id(&self) -> SessionId;
    fn kind(&self) -> SessionKind;
    fn remote_contact(&self) -> Option<ContactId>;

    /// Invitation came from the remote party
    fn is_initiated_by_remote(&self) -> bool;
    /// Dialog is confirmed and media may flow
    fn is_dialog_established(&self) -> bool;
    /// Invitation was accepted locally
    fn is_accepted(&self) -> bool;
    /// All content has been transferred
    fn is_content_transferred(&self) -> bool;

    fn content(&self) -> Option<ContentInfo>;
    fn service_id(&self) -> Option<ServiceId>;
    fn chat_id(&self) -> Option<String> {
        None
    }

    /// Largest payload accepted by `send_data`; 0 means unlimited
    fn max_message_size(&self) -> usize;

    fn timestamp(&self) -> i64;

    /// Register the receiver of this session's lifecycle events
    fn add_event_sink(&self, sink: Arc<dyn SessionEventSink>);

    async fn start(&self) -> std::result::Result<(), EngineError>;
    async fn accept(&self) -> std::result::Result<(), EngineError>;
    async fn reject(&self, reason: TerminationReason) -> std::result::Result<(), EngineError>;
    async fn terminate(&self, reason: TerminationReason) -> std::result::Result<(), EngineError>;
    async fn send_data(&self, data: Bytes) -> std::result::Result<(), EngineError>;
}

/// Public state implied by a live session's current attributes
pub fn derive_state(live: &dyn LiveSession) -> SessionState {
    if live.kind().has_transfer() && live.is_content_transferred() {
        SessionState::Transferred
    } else if live.is_dialog_established() {
        SessionState::Started
    } else if live.is_initiated_by_remote() {
        if live.is_accepted() {
            SessionState::Accepting
        } else {
            SessionState::Invited
        }
    } else {
        SessionState::Initiating
    }
}

/// Resolves a session id to its live session, if one is still tracked
pub trait LiveSessionLookup: Send + Sync {
    fn lookup(&self, id: &SessionId) -> Option<Arc<dyn LiveSession>>;
}

/// Parameters for an outbound session
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub kind: SessionKind,
    pub contact: ContactId,
    pub content: Option<ContentInfo>,
    pub service_id: Option<ServiceId>,
}

/// Protocol engine entry points used by the services
#[async_trait]
pub trait SessionEngine: LiveSessionLookup {
    /// Whether the engine is registered to the network
    fn is_registered(&self) -> bool;

    /// Create (but do not start) an outbound live session
    async fn initiate(&self, request: OutgoingRequest) -> std::result::Result<Arc<dyn LiveSession>, EngineError>;
}

/// Lifecycle callbacks raised by a live session
///
/// Implemented by the session facade. Callbacks for one session are expected
/// to be delivered in the order the engine observed them.
#[async_trait]
pub trait SessionEventSink: Send + Sync {
    async fn on_invited(&self) -> Result<()>;
    async fn on_ringing(&self) -> Result<()>;
    async fn on_accepted(&self) -> Result<()>;
    async fn on_started(&self) -> Result<()>;
    async fn on_rejected_by_user(&self) -> Result<()>;
    async fn on_rejected_by_remote(&self) -> Result<()>;
    async fn on_rejected_by_timeout(&self) -> Result<()>;
    async fn on_aborted(&self, reason: TerminationReason) -> Result<()>;
    async fn on_error(&self, code: i32) -> Result<()>;
    async fn on_progress(&self, current: u64, total: u64) -> Result<()>;
    async fn on_transferred(&self) -> Result<()>;
    async fn on_data_received(&self, data: Bytes) -> Result<()>;
    async fn on_delivered(&self, timestamp: i64) -> Result<()>;
    async fn on_displayed(&self, timestamp: i64) -> Result<()>;
}
