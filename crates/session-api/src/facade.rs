//! Per-session facade
//!
//! A [`SessionFacade`] is the stable handle API consumers hold for one session
//! id. It answers queries from the live session while the protocol engine still
//! tracks it, and from the persisted record afterwards. It is also the event
//! sink the live session reports lifecycle changes to.
//!
//! # Locking
//!
//! Each facade owns two mutexes, always taken in this order:
//!
//! 1. the **publish** mutex serializes event handling; it is held from reading
//!    the current state until every listener has seen the resulting event;
//! 2. the **state** mutex guards the persisted view; it is held only while the
//!    transition is read and persisted, and released before listeners run.
//!
//! Listeners may therefore query their own facade while handling an event, and
//! observe the transitions of a session in the order they were persisted.
//! Queries only ever take the state mutex; those answered by the live session
//! take neither.
//!
//! # Control operations
//!
//! Accept, reject, abort and send are validated synchronously and then queued
//! on the owning service's [`OperationScheduler`]. Their outcome only shows up
//! as later events; a failed action turns into a `Failed` transition.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

use crate::accessor::PersistedAccessor;
use crate::auth::AuthorizationCheck;
use crate::errors::{EngineError, Result, ServiceError, StoreError};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::live::{derive_state, LiveSession, LiveSessionLookup, SessionEventSink};
use crate::registry::SessionRegistry;
use crate::scheduler::OperationScheduler;
use crate::state_graph::{self, Transition};
use crate::store::{PersistedStore, SessionRecord};
use crate::translator::{self, error_codes, ProtocolCode, StateAndReason, TerminationReason};
use crate::types::{
    ContactId, ContentInfo, Direction, ReasonCode, ServiceId, SessionId, SessionKind, SessionState,
};

/// Collaborators shared by every facade of a service
#[derive(Clone)]
pub struct FacadeContext {
    pub kind: SessionKind,
    pub registry: Weak<SessionRegistry>,
    pub lookup: Arc<dyn LiveSessionLookup>,
    pub store: Arc<dyn PersistedStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub scheduler: Arc<OperationScheduler>,
    pub authorization: Arc<dyn AuthorizationCheck>,
    /// Payload limit used when the live session reports none (0 = unlimited)
    pub default_max_message_size: usize,
}

/// Build the first persisted row for a live session
pub fn initial_record(live: &dyn LiveSession, state: SessionState) -> SessionRecord {
    let direction = if live.is_initiated_by_remote() {
        Direction::Incoming
    } else {
        Direction::Outgoing
    };
    let mut record = SessionRecord::new(live.session_id(), live.kind(), direction, state, live.timestamp())
        .with_content(live.content())
        .with_service_id(live.service_id());
    record.contact = live.remote_contact();
    record.chat_id = live.chat_id();
    record
}

pub struct SessionFacade {
    id: SessionId,
    kind: SessionKind,
    registry: Weak<SessionRegistry>,
    lookup: Arc<dyn LiveSessionLookup>,
    broadcaster: Arc<EventBroadcaster>,
    scheduler: Arc<OperationScheduler>,
    authorization: Arc<dyn AuthorizationCheck>,
    default_max_message_size: usize,
    persisted: Mutex<PersistedAccessor>,
    publish: Mutex<()>,
    /// Set once a terminal state is persisted; queries then skip the live session
    terminal: AtomicBool,
    this: Weak<SessionFacade>,
}

impl SessionFacade {
    pub fn new(id: SessionId, context: FacadeContext) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            persisted: Mutex::new(PersistedAccessor::new(id.clone(), context.store)),
            id,
            kind: context.kind,
            registry: context.registry,
            lookup: context.lookup,
            broadcaster: context.broadcaster,
            scheduler: context.scheduler,
            authorization: context.authorization,
            default_max_message_size: context.default_max_message_size,
            publish: Mutex::new(()),
            terminal: AtomicBool::new(false),
            this: this.clone(),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Live session to answer from, if it is still the source of truth
    fn live(&self) -> Option<Arc<dyn LiveSession>> {
        if self.terminal.load(Ordering::Acquire) {
            return None;
        }
        self.lookup.lookup(&self.id)
    }

    fn require_live(&self) -> Result<Arc<dyn LiveSession>> {
        self.lookup
            .lookup(&self.id)
            .ok_or_else(|| ServiceError::not_available(format!("session {} is not available", self.id)))
    }

    // ---- queries ----

    pub async fn get_state(&self) -> Result<SessionState> {
        if let Some(live) = self.live() {
            return Ok(derive_state(live.as_ref()));
        }
        self.persisted.lock().await.state().await
    }

    pub async fn get_reason_code(&self) -> Result<ReasonCode> {
        if self.live().is_some() {
            return Ok(ReasonCode::Unspecified);
        }
        self.persisted.lock().await.reason_code().await
    }

    pub async fn get_remote_contact(&self) -> Result<Option<ContactId>> {
        if let Some(live) = self.live() {
            return Ok(live.remote_contact());
        }
        self.persisted.lock().await.contact().await
    }

    pub async fn get_direction(&self) -> Result<Direction> {
        if let Some(live) = self.live() {
            return Ok(if live.is_initiated_by_remote() {
                Direction::Incoming
            } else {
                Direction::Outgoing
            });
        }
        self.persisted.lock().await.direction().await
    }

    pub async fn get_content(&self) -> Result<Option<ContentInfo>> {
        if let Some(live) = self.live() {
            return Ok(live.content());
        }
        self.persisted.lock().await.content().await
    }

    pub async fn get_service_id(&self) -> Result<Option<ServiceId>> {
        if let Some(live) = self.live() {
            return Ok(live.service_id());
        }
        self.persisted.lock().await.service_id().await
    }

    pub async fn get_chat_id(&self) -> Result<Option<String>> {
        if let Some(live) = self.live() {
            return Ok(live.chat_id());
        }
        self.persisted.lock().await.chat_id().await
    }

    pub async fn get_timestamp(&self) -> Result<i64> {
        if let Some(live) = self.live() {
            return Ok(live.timestamp());
        }
        self.persisted.lock().await.timestamp().await
    }

    pub async fn get_progress(&self) -> Result<u64> {
        self.persisted.lock().await.progress().await
    }

    pub async fn get_timestamp_delivered(&self) -> Result<i64> {
        self.persisted.lock().await.timestamp_delivered().await
    }

    pub async fn get_timestamp_displayed(&self) -> Result<i64> {
        self.persisted.lock().await.timestamp_displayed().await
    }

    // ---- control ----

    pub async fn accept_invitation(&self) -> Result<()> {
        let live = self.require_live()?;
        self.authorize(live.as_ref())?;
        if !live.is_initiated_by_remote() {
            return Err(ServiceError::unsupported("cannot accept an outgoing session"));
        }
        if live.is_accepted() {
            return Err(ServiceError::permission_denied(format!(
                "session {} is already accepted",
                self.id
            )));
        }
        self.dispatch("accept", error_codes::SESSION_INITIATION_FAILED, live, |live| async move {
            live.accept().await
        })
    }

    pub async fn reject_invitation(&self) -> Result<()> {
        let live = self.require_live()?;
        self.authorize(live.as_ref())?;
        if !live.is_initiated_by_remote() {
            return Err(ServiceError::unsupported("cannot reject an outgoing session"));
        }
        self.dispatch("reject", error_codes::SESSION_INITIATION_FAILED, live, |live| async move {
            live.reject(TerminationReason::ByUser).await
        })
    }

    /// Ask the engine to end the session
    ///
    /// A no-op once the session is terminal, including a transferred session
    /// the engine has not dropped yet.
    pub async fn abort_session(&self) -> Result<()> {
        if let Some(state) = self.persisted_state().await? {
            if state.is_terminal() {
                debug!(session_id = %self.id, %state, "Session already terminal, ignoring abort");
                return Ok(());
            }
        }
        let live = self.require_live()?;
        if live.kind().has_transfer() && live.is_content_transferred() {
            debug!(session_id = %self.id, "Content already transferred, ignoring abort");
            return Ok(());
        }
        self.authorize(live.as_ref())?;
        self.dispatch("abort", self.media_failure_code(), live, |live| async move {
            live.terminate(TerminationReason::ByUser).await
        })
    }

    pub async fn send_data(&self, data: Bytes) -> Result<()> {
        if data.is_empty() {
            return Err(ServiceError::validation("content must not be empty"));
        }
        if !self.kind.is_multimedia() {
            return Err(ServiceError::unsupported(format!(
                "{} sessions do not carry messages",
                self.kind
            )));
        }
        let live = self.require_live()?;
        self.authorize(live.as_ref())?;
        let max = match live.max_message_size() {
            0 => self.default_max_message_size,
            size => size,
        };
        if max > 0 && data.len() > max {
            return Err(ServiceError::PayloadTooLarge { size: data.len(), max });
        }
        self.dispatch("send", self.media_failure_code(), live, |live| async move {
            live.send_data(data).await
        })
    }

    fn authorize(&self, live: &dyn LiveSession) -> Result<()> {
        match live.service_id() {
            Some(service_id) => self.authorization.check(&service_id),
            None => Ok(()),
        }
    }

    fn media_failure_code(&self) -> i32 {
        if self.kind.is_multimedia() {
            error_codes::MEDIA_FAILED
        } else {
            error_codes::MEDIA_TRANSFER_FAILED
        }
    }

    /// Queue a control action; its failure becomes a `Failed` transition
    fn dispatch<F, Fut>(&self, action: &'static str, failure_code: i32, live: Arc<dyn LiveSession>, op: F) -> Result<()>
    where
        F: FnOnce(Arc<dyn LiveSession>) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), EngineError>> + Send + 'static,
    {
        let facade = self
            .this
            .upgrade()
            .ok_or_else(|| ServiceError::internal("facade dropped while dispatching"))?;
        trace!(session_id = %self.id, action, "Dispatching control action");
        self.scheduler.try_submit(format!("{} {}", action, self.id), async move {
            if let Err(e) = op(live).await {
                facade.on_action_failed(action, failure_code).await;
                anyhow::bail!("{} failed for session {}: {}", action, facade.id, e);
            }
            Ok(())
        })
    }

    async fn on_action_failed(&self, action: &str, failure_code: i32) {
        warn!(session_id = %self.id, action, "Control action failed");
        if let Err(e) = self.apply_code(ProtocolCode::Error(failure_code)).await {
            error!(session_id = %self.id, error = %e, "Could not record failed action");
        }
    }

    fn leave_registry(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }

    async fn persisted_state(&self) -> Result<Option<SessionState>> {
        match self.persisted.lock().await.state().await {
            Ok(state) => Ok(Some(state)),
            Err(ServiceError::Storage(StoreError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ---- transitions ----

    /// Write the first row for this session
    pub async fn insert_record(&self, record: SessionRecord) -> Result<()> {
        if !state_graph::is_initial(record.state) {
            return Err(ServiceError::internal(format!(
                "session {} cannot start in state {}",
                self.id, record.state
            )));
        }
        debug!(session_id = %self.id, state = %record.state, "Persisting new session");
        if record.state.is_terminal() {
            self.terminal.store(true, Ordering::Release);
        }
        self.persisted.lock().await.insert(record).await
    }

    async fn apply_code(&self, code: ProtocolCode) -> Result<()> {
        let target = translator::translate(self.kind, code).inspect_err(|e| {
            error!(session_id = %self.id, %code, error = %e, "Untranslatable protocol code");
        })?;
        self.apply(target).await
    }

    /// Persist `target`, leave the registry if terminal, then publish
    async fn apply(&self, target: StateAndReason) -> Result<()> {
        let _publish = self.publish.lock().await;
        let event = self.persist_transition(target).await?;
        if let Some(event) = event {
            self.broadcaster.publish(event).await;
        }
        Ok(())
    }

    /// Check and persist `target` under the state lock
    ///
    /// Returns the event to publish, if the row changed.
    async fn persist_transition(&self, target: StateAndReason) -> Result<Option<SessionEvent>> {
        let mut persisted = self.persisted.lock().await;
        let (current, _) = persisted.state_and_reason().await?;

        match state_graph::check(self.kind, current, target.state) {
            Transition::Allowed => {}
            Transition::Unchanged => {
                trace!(session_id = %self.id, state = %current, "State unchanged");
                return Ok(None);
            }
            Transition::AlreadyTerminal => {
                debug!(
                    session_id = %self.id,
                    current = %current,
                    requested = %target.state,
                    "Session already terminal, ignoring transition"
                );
                return Ok(None);
            }
            Transition::Invalid => {
                error!(
                    session_id = %self.id,
                    kind = %self.kind,
                    from = %current,
                    to = %target.state,
                    "Transition outside the state graph"
                );
                return Err(ServiceError::internal(format!(
                    "invalid transition {} -> {} for {} session {}",
                    current, target.state, self.kind, self.id
                )));
            }
        }

        let changed = persisted.set_state_and_reason(target.state, target.reason).await?;
        if target.state.is_terminal() {
            self.terminal.store(true, Ordering::Release);
            self.leave_registry();
        }
        let contact = persisted.contact().await?;
        debug!(
            session_id = %self.id,
            from = %current,
            to = %target.state,
            reason = %target.reason,
            "Session state changed"
        );

        Ok(changed.then(|| SessionEvent::StateChanged {
            kind: self.kind,
            session_id: self.id.clone(),
            contact,
            state: target.state,
            reason: target.reason,
        }))
    }

    /// Write the invited row unless an earlier invitation already did
    ///
    /// Returns the live session when a row was inserted.
    async fn record_invitation(&self) -> Result<Option<Arc<dyn LiveSession>>> {
        let live = self.require_live()?;
        let mut persisted = self.persisted.lock().await;
        if persisted.exists().await? {
            return Ok(None);
        }
        persisted.insert(initial_record(live.as_ref(), SessionState::Invited)).await?;
        Ok(Some(live))
    }

    async fn contact_for_event(&self) -> Result<Option<ContactId>> {
        if let Some(live) = self.live() {
            return Ok(live.remote_contact());
        }
        self.persisted.lock().await.contact().await
    }
}

#[async_trait]
impl SessionEventSink for SessionFacade {
    async fn on_invited(&self) -> Result<()> {
        let _publish = self.publish.lock().await;
        let live = match self.record_invitation().await {
            Ok(Some(live)) => live,
            Ok(None) => {
                debug!(session_id = %self.id, "Invitation already recorded, ignoring");
                return Ok(());
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Could not record invitation");
                self.leave_registry();
                return Err(e);
            }
        };
        debug!(session_id = %self.id, kind = %self.kind, "Invitation received");

        self.broadcaster
            .publish(SessionEvent::Invitation {
                kind: self.kind,
                session_id: self.id.clone(),
                contact: live.remote_contact(),
            })
            .await;
        Ok(())
    }

    async fn on_ringing(&self) -> Result<()> {
        self.apply(StateAndReason::unspecified(SessionState::Ringing)).await
    }

    async fn on_accepted(&self) -> Result<()> {
        self.apply(StateAndReason::unspecified(SessionState::Accepting)).await
    }

    async fn on_started(&self) -> Result<()> {
        self.apply(StateAndReason::unspecified(SessionState::Started)).await
    }

    async fn on_rejected_by_user(&self) -> Result<()> {
        self.apply_code(ProtocolCode::Rejected(TerminationReason::ByUser)).await
    }

    async fn on_rejected_by_remote(&self) -> Result<()> {
        self.apply_code(ProtocolCode::Rejected(TerminationReason::ByRemote)).await
    }

    async fn on_rejected_by_timeout(&self) -> Result<()> {
        self.apply_code(ProtocolCode::Rejected(TerminationReason::ByTimeout)).await
    }

    async fn on_aborted(&self, reason: TerminationReason) -> Result<()> {
        // A remote hang-up right after the last byte still counts as a transfer
        if reason == TerminationReason::ByRemote && self.kind.has_transfer() {
            if let Some(live) = self.lookup.lookup(&self.id) {
                if live.is_content_transferred() {
                    return self.apply(StateAndReason::unspecified(SessionState::Transferred)).await;
                }
            }
        }
        self.apply_code(ProtocolCode::Aborted(reason)).await
    }

    async fn on_error(&self, code: i32) -> Result<()> {
        self.apply_code(ProtocolCode::Error(code)).await
    }

    async fn on_progress(&self, current: u64, total: u64) -> Result<()> {
        let _publish = self.publish.lock().await;
        let (changed, contact) = {
            let mut persisted = self.persisted.lock().await;
            let changed = persisted.set_progress(current).await?;
            (changed, persisted.contact().await?)
        };
        if changed {
            self.broadcaster
                .publish(SessionEvent::ProgressUpdate {
                    kind: self.kind,
                    session_id: self.id.clone(),
                    contact,
                    current,
                    total,
                })
                .await;
        }
        Ok(())
    }

    async fn on_transferred(&self) -> Result<()> {
        self.apply(StateAndReason::unspecified(SessionState::Transferred)).await
    }

    async fn on_data_received(&self, data: Bytes) -> Result<()> {
        let _publish = self.publish.lock().await;
        let contact = self.contact_for_event().await?;
        self.broadcaster
            .publish(SessionEvent::MessageReceived {
                kind: self.kind,
                session_id: self.id.clone(),
                contact,
                content: data,
            })
            .await;
        Ok(())
    }

    async fn on_delivered(&self, timestamp: i64) -> Result<()> {
        let changed = self.persisted.lock().await.set_timestamp_delivered(timestamp).await?;
        trace!(session_id = %self.id, changed, "Delivery reported");
        Ok(())
    }

    async fn on_displayed(&self, timestamp: i64) -> Result<()> {
        let changed = self.persisted.lock().await.set_timestamp_displayed(timestamp).await?;
        trace!(session_id = %self.id, changed, "Display reported");
        Ok(())
    }
}

impl std::fmt::Debug for SessionFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFacade")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("terminal", &self.terminal.load(Ordering::Relaxed))
            .finish()
    }
}
