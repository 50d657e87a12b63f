//! Session events and listener fan-out
//!
//! Listeners register with an [`EventBroadcaster`] either for every session of
//! a service ([`ListenerScope::All`]) or for the sessions of one remote contact
//! ([`ListenerScope::Contact`]). Dispatch is best effort:
//!
//! - listeners are called one after another, so each one observes the events of
//!   a session in the order they were published;
//! - a listener that fails or exceeds the dispatch timeout is dropped after the
//!   current publish, without affecting delivery to the others;
//! - publishing with no listeners simply drops the event.
//!
//! # Example
//!
//! ```rust
//! use rvoip_session_api::events::{EventBroadcaster, ListenerScope, SessionEvent, SessionListener};
//! use rvoip_session_api::errors::ListenerError;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl SessionListener for Printer {
//!     async fn on_event(&self, event: &SessionEvent) -> Result<(), ListenerError> {
//!         println!("{:?}", event);
//!         Ok(())
//!     }
//! }
//!
//! let broadcaster = EventBroadcaster::default();
//! let id = broadcaster.subscribe(Arc::new(Printer), ListenerScope::All);
//! assert_eq!(broadcaster.subscription_count(), 1);
//! assert!(broadcaster.unsubscribe(id));
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::capability::Capabilities;
use crate::errors::ListenerError;
use crate::types::{ContactId, ReasonCode, SessionId, SessionKind, SessionState};

/// Identifier handed out on subscription
pub type ListenerId = Uuid;

/// Default time a single listener may take to handle one event
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Events published to API listeners
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    /// Public state of a session changed
    StateChanged {
        kind: SessionKind,
        session_id: SessionId,
        contact: Option<ContactId>,
        state: SessionState,
        reason: ReasonCode,
    },

    /// Transfer progress of a content-bearing session
    ProgressUpdate {
        kind: SessionKind,
        session_id: SessionId,
        contact: Option<ContactId>,
        current: u64,
        total: u64,
    },

    /// New incoming session (including invitations rejected on arrival)
    Invitation {
        kind: SessionKind,
        session_id: SessionId,
        contact: Option<ContactId>,
    },

    /// Payload received on a multimedia session
    MessageReceived {
        kind: SessionKind,
        session_id: SessionId,
        contact: Option<ContactId>,
        #[serde(skip)]
        content: Bytes,
    },

    /// Capabilities of a contact were refreshed
    CapabilitiesChanged {
        contact: ContactId,
        capabilities: Capabilities,
    },
}

impl SessionEvent {
    /// Remote contact the event relates to, used for scoped delivery
    pub fn contact(&self) -> Option<&ContactId> {
        match self {
            SessionEvent::StateChanged { contact, .. }
            | SessionEvent::ProgressUpdate { contact, .. }
            | SessionEvent::Invitation { contact, .. }
            | SessionEvent::MessageReceived { contact, .. } => contact.as_ref(),
            SessionEvent::CapabilitiesChanged { contact, .. } => Some(contact),
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            SessionEvent::StateChanged { session_id, .. }
            | SessionEvent::ProgressUpdate { session_id, .. }
            | SessionEvent::Invitation { session_id, .. }
            | SessionEvent::MessageReceived { session_id, .. } => Some(session_id),
            SessionEvent::CapabilitiesChanged { .. } => None,
        }
    }
}

/// Receiver of session events
///
/// Returning an error (or [`ListenerError::Disconnected`]) marks the listener
/// as dead; it is removed after the publish that observed the failure.
#[async_trait]
pub trait SessionListener: Send + Sync {
    async fn on_event(&self, event: &SessionEvent) -> Result<(), ListenerError>;
}

/// Which events a listener receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerScope {
    All,
    Contact(ContactId),
}

impl ListenerScope {
    pub fn matches(&self, event: &SessionEvent) -> bool {
        match self {
            ListenerScope::All => true,
            ListenerScope::Contact(contact) => event.contact() == Some(contact),
        }
    }
}

#[derive(Clone)]
struct Subscription {
    id: ListenerId,
    listener: Arc<dyn SessionListener>,
    scope: ListenerScope,
}

/// Fan-out of events to registered listeners
pub struct EventBroadcaster {
    subscriptions: RwLock<Vec<Subscription>>,
    dispatch_timeout: Duration,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCH_TIMEOUT)
    }
}

impl EventBroadcaster {
    pub fn new(dispatch_timeout: Duration) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            dispatch_timeout,
        }
    }

    /// Register a listener and return its id
    pub fn subscribe(&self, listener: Arc<dyn SessionListener>, scope: ListenerScope) -> ListenerId {
        let id = Uuid::new_v4();
        self.subscriptions.write().push(Subscription { id, listener, scope });
        trace!(listener_id = %id, "Listener subscribed");
        id
    }

    /// Remove a listener; `false` if it was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        match subscriptions.iter().position(|s| s.id == id) {
            Some(pos) => {
                subscriptions.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver `event` to every matching listener
    ///
    /// Returns the number of listeners that accepted the event.
    pub async fn publish(&self, event: SessionEvent) -> usize {
        let targets: Vec<Subscription> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.scope.matches(&event))
            .cloned()
            .collect();

        if targets.is_empty() {
            trace!(?event, "No listeners, dropping event");
            return 0;
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for subscription in targets {
            match tokio::time::timeout(self.dispatch_timeout, subscription.listener.on_event(&event)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(listener_id = %subscription.id, error = %e, "Listener failed, unregistering");
                    dead.push(subscription.id);
                }
                Err(_) => {
                    warn!(listener_id = %subscription.id, "Listener timed out, unregistering");
                    dead.push(subscription.id);
                }
            }
        }

        if !dead.is_empty() {
            self.subscriptions.write().retain(|s| !dead.contains(&s.id));
        }
        delivered
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriptions", &self.subscription_count())
            .field("dispatch_timeout", &self.dispatch_timeout)
            .finish()
    }
}
