//! Per-kind session service
//!
//! A [`SessionService`] is the API entry point for one [`SessionKind`]. It owns
//! the registry of live facades, the listener fan-out and the scheduler used
//! for control actions, and builds facades for outbound sessions, incoming
//! invitations and history lookups.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::AuthorizationCheck;
use crate::config::ServiceConfig;
use crate::errors::{Result, ServiceError};
use crate::events::{EventBroadcaster, ListenerId, ListenerScope, SessionEvent, SessionListener};
use crate::facade::{initial_record, FacadeContext, SessionFacade};
use crate::live::{LiveSession, LiveSessionLookup, OutgoingRequest, SessionEngine, SessionEventSink};
use crate::registry::SessionRegistry;
use crate::scheduler::OperationScheduler;
use crate::store::{PersistedStore, SessionRecord};
use crate::translator::{error_codes, TerminationReason};
use crate::types::{ContactId, ContentInfo, Direction, ReasonCode, ServiceId, SessionId, SessionKind, SessionState};

/// User-facing settings of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub auto_accept: bool,
    pub auto_accept_in_roaming: bool,
    pub auto_accept_changeable: bool,
}

impl ServiceSettings {
    fn from_config(config: &ServiceConfig) -> Self {
        Self {
            auto_accept: config.auto_accept,
            auto_accept_in_roaming: config.auto_accept_in_roaming,
            auto_accept_changeable: config.auto_accept_changeable,
        }
    }
}

pub struct SessionService {
    kind: SessionKind,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    scheduler: Arc<OperationScheduler>,
    store: Arc<dyn PersistedStore>,
    engine: Arc<dyn SessionEngine>,
    lookup: Arc<dyn LiveSessionLookup>,
    authorization: Arc<dyn AuthorizationCheck>,
    default_max_message_size: usize,
    settings: RwLock<ServiceSettings>,
}

impl SessionService {
    /// Create the service for `kind`; spawns its scheduler worker
    pub fn new<E>(kind: SessionKind, config: &ServiceConfig, engine: Arc<E>, store: Arc<dyn PersistedStore>) -> Self
    where
        E: SessionEngine + 'static,
    {
        info!(%kind, "Session service started");
        Self {
            kind,
            registry: Arc::new(SessionRegistry::new(kind)),
            broadcaster: Arc::new(EventBroadcaster::new(config.dispatch_timeout())),
            scheduler: Arc::new(OperationScheduler::new(kind.name(), config.queue_capacity)),
            store,
            lookup: engine.clone(),
            engine,
            authorization: config.authorization(),
            default_max_message_size: config.max_message_size,
            settings: RwLock::new(ServiceSettings::from_config(config)),
        }
    }

    /// Replace the authorization policy derived from the configuration
    pub fn with_authorization(mut self, authorization: Arc<dyn AuthorizationCheck>) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn context(&self) -> FacadeContext {
        FacadeContext {
            kind: self.kind,
            registry: Arc::downgrade(&self.registry),
            lookup: self.lookup.clone(),
            store: self.store.clone(),
            broadcaster: self.broadcaster.clone(),
            scheduler: self.scheduler.clone(),
            authorization: self.authorization.clone(),
            default_max_message_size: self.default_max_message_size,
        }
    }

    fn check_arguments(&self, content: Option<&ContentInfo>, service_id: Option<&ServiceId>) -> Result<()> {
        if let Some(content) = content {
            content.validate()?;
        }
        match self.kind {
            SessionKind::ImageSharing | SessionKind::GeolocSharing | SessionKind::FileUpload if content.is_none() => {
                Err(ServiceError::validation(format!("{} requires content", self.kind)))
            }
            SessionKind::MultimediaMessaging | SessionKind::MultimediaStreaming => match service_id {
                Some(service_id) => self.authorization.check(service_id),
                None => Err(ServiceError::validation(format!("{} requires a service id", self.kind))),
            },
            _ => Ok(()),
        }
    }

    /// Start an outbound session towards `contact`
    pub async fn initiate_session(
        &self,
        contact: &str,
        content: Option<ContentInfo>,
        service_id: Option<&str>,
    ) -> Result<Arc<SessionFacade>> {
        let contact = ContactId::parse(contact)?;
        let service_id = service_id.map(ServiceId::parse).transpose()?;
        self.check_arguments(content.as_ref(), service_id.as_ref())?;
        if !self.engine.is_registered() {
            return Err(ServiceError::not_available(format!("{} service is not registered", self.kind)));
        }

        let live = self
            .engine
            .initiate(OutgoingRequest {
                kind: self.kind,
                contact,
                content,
                service_id,
            })
            .await?;
        let id = live.session_id();
        debug!(kind = %self.kind, session_id = %id, "Initiating session");

        let facade = SessionFacade::new(id.clone(), self.context());
        if let Err(e) = self.track_outgoing(&facade, live.as_ref()).await {
            warn!(session_id = %id, error = %e, "Could not track new session, terminating it");
            if let Err(e) = live.terminate(TerminationReason::BySystem).await {
                warn!(session_id = %id, error = %e, "Could not terminate untracked session");
            }
            return Err(e);
        }
        live.add_event_sink(facade.clone());

        if let Err(e) = live.start().await {
            warn!(session_id = %id, error = %e, "Session failed to start");
            if let Err(e) = facade.on_error(error_codes::SESSION_INITIATION_FAILED).await {
                warn!(session_id = %id, error = %e, "Could not record start failure");
            }
            return Err(e.into());
        }
        Ok(facade)
    }

    /// Register `facade` and write its first row; undoes the registration on failure
    async fn track_outgoing(&self, facade: &Arc<SessionFacade>, live: &dyn LiveSession) -> Result<()> {
        self.registry.put(facade.id().clone(), facade.clone())?;
        let inserted = facade
            .insert_record(initial_record(live, SessionState::Initiating))
            .await;
        if inserted.is_err() {
            self.registry.remove(facade.id());
        }
        inserted
    }

    /// Track an invitation raised by the engine
    ///
    /// The engine reports `on_invited` to the returned facade afterwards, which
    /// persists the record and notifies listeners. If that fails the facade
    /// leaves the registry again.
    pub fn receive_invitation(&self, live: Arc<dyn LiveSession>) -> Result<Arc<SessionFacade>> {
        if live.kind() != self.kind {
            return Err(ServiceError::internal(format!(
                "{} session offered to {} service",
                live.kind(),
                self.kind
            )));
        }
        let id = live.session_id();
        let facade = SessionFacade::new(id.clone(), self.context());
        self.registry.put(id.clone(), facade.clone())?;
        live.add_event_sink(facade.clone());
        debug!(kind = %self.kind, session_id = %id, "Invitation tracked");
        Ok(facade)
    }

    /// Record an invitation that was refused before a live session existed
    pub async fn add_rejected_invitation(
        &self,
        contact: &str,
        content: Option<ContentInfo>,
        reason: ReasonCode,
        timestamp: i64,
    ) -> Result<SessionId> {
        let contact = ContactId::parse(contact)?;
        let id = SessionId::new();
        let record = SessionRecord::new(id.clone(), self.kind, Direction::Incoming, SessionState::Rejected, timestamp)
            .with_contact(contact.clone())
            .with_content(content)
            .with_reason(reason);
        self.store.write(&id, record).await?;
        debug!(kind = %self.kind, session_id = %id, %reason, "Rejected invitation stored");

        self.broadcaster
            .publish(SessionEvent::Invitation {
                kind: self.kind,
                session_id: id.clone(),
                contact: Some(contact),
            })
            .await;
        Ok(id)
    }

    /// Facade for `id`, live or historical
    pub fn get_session(&self, id: &str) -> Result<Arc<SessionFacade>> {
        let id = SessionId::parse(id)?;
        if let Some(facade) = self.registry.get(&id) {
            return Ok(facade);
        }
        Ok(SessionFacade::new(id, self.context()))
    }

    /// Facades of every session with a live counterpart
    pub fn list_sessions(&self) -> Vec<Arc<SessionFacade>> {
        self.registry.list()
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionListener>, scope: ListenerScope) -> ListenerId {
        self.broadcaster.subscribe(listener, scope)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub fn settings(&self) -> ServiceSettings {
        *self.settings.read()
    }

    pub fn set_auto_accept(&self, enabled: bool) -> Result<()> {
        let mut settings = self.settings.write();
        if !settings.auto_accept_changeable {
            return Err(ServiceError::unsupported("auto accept mode is not changeable"));
        }
        settings.auto_accept = enabled;
        if !enabled {
            settings.auto_accept_in_roaming = false;
        }
        Ok(())
    }

    pub fn set_auto_accept_in_roaming(&self, enabled: bool) -> Result<()> {
        let mut settings = self.settings.write();
        if !settings.auto_accept_changeable {
            return Err(ServiceError::unsupported("auto accept mode is not changeable"));
        }
        if enabled && !settings.auto_accept {
            return Err(ServiceError::unsupported("auto accept in roaming requires auto accept"));
        }
        settings.auto_accept_in_roaming = enabled;
        Ok(())
    }

    /// Forget live facades and stop the control scheduler
    pub async fn close(&self) {
        self.registry.clear();
        self.scheduler.shutdown().await;
        info!(kind = %self.kind, "Session service stopped");
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("kind", &self.kind)
            .field("registry", &self.registry.stats())
            .field("broadcaster", &self.broadcaster)
            .field("settings", &self.settings())
            .finish()
    }
}
