//! Capability refresh
//!
//! Refresh requests are queued on a dedicated "capability" scheduler, so a
//! request for all contacts and requests for single contacts never run
//! concurrently. A single-contact request for a contact that is already queued
//! is dropped. Results are published as [`SessionEvent::CapabilitiesChanged`].

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::errors::{EngineError, Result, ServiceError};
use crate::events::{EventBroadcaster, ListenerId, ListenerScope, SessionEvent, SessionListener};
use crate::scheduler::OperationScheduler;
use crate::types::{now_millis, ContactId};

/// Features a contact supports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub image_sharing: bool,
    pub video_sharing: bool,
    pub geoloc_push: bool,
    pub file_transfer: bool,
    pub chat: bool,
    /// Extension service ids
    pub extensions: Vec<String>,
    /// Contact is a machine endpoint rather than a person
    pub automata: bool,
    /// When the capabilities were last refreshed, epoch millis
    pub timestamp: i64,
}

/// Capability discovery as performed by the protocol engine
#[async_trait]
pub trait CapabilityEngine: Send + Sync {
    fn is_registered(&self) -> bool;

    /// Query one contact; may take a network round trip
    async fn request_capabilities(&self, contact: &ContactId) -> std::result::Result<Capabilities, EngineError>;

    /// Every contact known to the address book
    async fn all_contacts(&self) -> std::result::Result<Vec<ContactId>, EngineError>;
}

pub struct CapabilityService {
    engine: Arc<dyn CapabilityEngine>,
    scheduler: OperationScheduler,
    broadcaster: Arc<EventBroadcaster>,
    pending: Arc<DashSet<ContactId>>,
}

impl CapabilityService {
    pub fn new(config: &ServiceConfig, engine: Arc<dyn CapabilityEngine>) -> Self {
        info!("Capability service started");
        Self {
            engine,
            scheduler: OperationScheduler::new("capability", config.queue_capacity),
            broadcaster: Arc::new(EventBroadcaster::new(config.dispatch_timeout())),
            pending: Arc::new(DashSet::new()),
        }
    }

    fn ensure_registered(&self) -> Result<()> {
        if self.engine.is_registered() {
            Ok(())
        } else {
            Err(ServiceError::not_available("capability service is not registered"))
        }
    }

    /// Queue a refresh for one contact
    pub async fn request_contact_capabilities(&self, contact: &str) -> Result<()> {
        let contact = ContactId::parse(contact)?;
        self.ensure_registered()?;
        if !self.pending.insert(contact.clone()) {
            debug!(%contact, "Capability refresh already queued");
            return Ok(());
        }

        let engine = self.engine.clone();
        let broadcaster = self.broadcaster.clone();
        let pending = self.pending.clone();
        let queued = contact.clone();
        let submitted = self
            .scheduler
            .submit(format!("capabilities {}", contact), async move {
                pending.remove(&contact);
                refresh(engine.as_ref(), &broadcaster, contact).await
            })
            .await;
        if submitted.is_err() {
            self.pending.remove(&queued);
        }
        submitted
    }

    /// Queue a refresh for several contacts
    pub async fn request_contacts_capabilities(&self, contacts: &[&str]) -> Result<()> {
        for contact in contacts {
            self.request_contact_capabilities(contact).await?;
        }
        Ok(())
    }

    /// Queue a refresh for the whole address book
    pub async fn request_all_contacts_capabilities(&self) -> Result<()> {
        self.ensure_registered()?;
        let engine = self.engine.clone();
        let broadcaster = self.broadcaster.clone();
        self.scheduler
            .submit("capabilities all", async move {
                let contacts = engine.all_contacts().await?;
                let total = contacts.len();
                let mut failed = 0;
                for contact in contacts {
                    if let Err(e) = refresh(engine.as_ref(), &broadcaster, contact).await {
                        warn!(error = %e, "Capability refresh failed");
                        failed += 1;
                    }
                }
                debug!(total, failed, "Refreshed all contact capabilities");
                Ok(())
            })
            .await
    }

    /// Listen to capability changes of every contact
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) -> ListenerId {
        self.broadcaster.subscribe(listener, ListenerScope::All)
    }

    /// Listen to capability changes of one contact
    pub fn add_contact_listener(&self, contact: &str, listener: Arc<dyn SessionListener>) -> Result<ListenerId> {
        let contact = ContactId::parse(contact)?;
        Ok(self.broadcaster.subscribe(listener, ListenerScope::Contact(contact)))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        info!("Capability service stopped");
    }
}

async fn refresh(
    engine: &dyn CapabilityEngine,
    broadcaster: &EventBroadcaster,
    contact: ContactId,
) -> anyhow::Result<()> {
    let mut capabilities = engine.request_capabilities(&contact).await?;
    if capabilities.timestamp == 0 {
        capabilities.timestamp = now_millis();
    }
    broadcaster
        .publish(SessionEvent::CapabilitiesChanged { contact, capabilities })
        .await;
    Ok(())
}

impl std::fmt::Debug for CapabilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityService")
            .field("scheduler", &self.scheduler)
            .field("pending", &self.pending.len())
            .finish()
    }
}
