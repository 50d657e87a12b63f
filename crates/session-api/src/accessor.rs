//! Read-through cache over one session's persisted record
//!
//! Attributes fall in three groups:
//!
//! - **Immutable** (direction, contact, content, service id, chat id, timestamp)
//!   are cached on first read and never read again.
//! - **Monotonic-once** (state and reason once terminal, delivered/displayed
//!   timestamps once non-zero) are cached once they hold a final value.
//! - **Volatile** (progress) always goes to the store.
//!
//! Any cache miss performs a single `read` that fills every cacheable field.
//! The accessor is not internally synchronized; the owning facade keeps it
//! behind its state mutex.

use std::sync::Arc;
use tracing::trace;

use crate::errors::{Result, StoreError};
use crate::store::{PersistedStore, SessionRecord};
use crate::types::{ContactId, ContentInfo, Direction, ReasonCode, ServiceId, SessionId, SessionState};

#[derive(Debug, Clone)]
struct Immutable {
    direction: Direction,
    contact: Option<ContactId>,
    content: Option<ContentInfo>,
    service_id: Option<ServiceId>,
    chat_id: Option<String>,
    timestamp: i64,
}

#[derive(Debug, Default)]
struct Cache {
    immutable: Option<Immutable>,
    final_state: Option<(SessionState, ReasonCode)>,
    timestamp_delivered: Option<i64>,
    timestamp_displayed: Option<i64>,
}

impl Cache {
    fn absorb(&mut self, record: &SessionRecord) {
        if self.immutable.is_none() {
            self.immutable = Some(Immutable {
                direction: record.direction,
                contact: record.contact.clone(),
                content: record.content.clone(),
                service_id: record.service_id.clone(),
                chat_id: record.chat_id.clone(),
                timestamp: record.timestamp,
            });
        }
        if record.state.is_terminal() {
            self.final_state = Some((record.state, record.reason_code));
        }
        if record.timestamp_delivered != 0 {
            self.timestamp_delivered = Some(record.timestamp_delivered);
        }
        if record.timestamp_displayed != 0 {
            self.timestamp_displayed = Some(record.timestamp_displayed);
        }
    }
}

/// Persisted view of a single session
pub struct PersistedAccessor {
    session_id: SessionId,
    store: Arc<dyn PersistedStore>,
    cache: Cache,
}

impl PersistedAccessor {
    pub fn new(session_id: SessionId, store: Arc<dyn PersistedStore>) -> Self {
        Self {
            session_id,
            store,
            cache: Cache::default(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    async fn fetch(&self) -> Result<SessionRecord> {
        self.store
            .read(&self.session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(self.session_id.to_string()).into())
    }

    async fn hydrate(&mut self) -> Result<SessionRecord> {
        trace!(session_id = %self.session_id, "Hydrating persisted cache");
        let record = self.fetch().await?;
        self.cache.absorb(&record);
        Ok(record)
    }

    async fn immutable(&mut self) -> Result<Immutable> {
        if let Some(fields) = &self.cache.immutable {
            return Ok(fields.clone());
        }
        self.hydrate().await?;
        self.cache
            .immutable
            .clone()
            .ok_or_else(|| StoreError::NotFound(self.session_id.to_string()).into())
    }

    /// Whether a row exists for this session
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.store.read(&self.session_id).await?.is_some())
    }

    /// Write the initial row and prime the cache from it
    pub async fn insert(&mut self, record: SessionRecord) -> Result<()> {
        self.store.write(&self.session_id, record.clone()).await?;
        self.cache.absorb(&record);
        Ok(())
    }

    pub async fn state_and_reason(&mut self) -> Result<(SessionState, ReasonCode)> {
        if let Some(cached) = self.cache.final_state {
            return Ok(cached);
        }
        let record = self.hydrate().await?;
        Ok((record.state, record.reason_code))
    }

    pub async fn state(&mut self) -> Result<SessionState> {
        Ok(self.state_and_reason().await?.0)
    }

    pub async fn reason_code(&mut self) -> Result<ReasonCode> {
        Ok(self.state_and_reason().await?.1)
    }

    pub async fn direction(&mut self) -> Result<Direction> {
        Ok(self.immutable().await?.direction)
    }

    pub async fn contact(&mut self) -> Result<Option<ContactId>> {
        Ok(self.immutable().await?.contact)
    }

    pub async fn content(&mut self) -> Result<Option<ContentInfo>> {
        Ok(self.immutable().await?.content)
    }

    pub async fn service_id(&mut self) -> Result<Option<ServiceId>> {
        Ok(self.immutable().await?.service_id)
    }

    pub async fn chat_id(&mut self) -> Result<Option<String>> {
        Ok(self.immutable().await?.chat_id)
    }

    pub async fn timestamp(&mut self) -> Result<i64> {
        Ok(self.immutable().await?.timestamp)
    }

    /// Never cached
    pub async fn progress(&self) -> Result<u64> {
        Ok(self.fetch().await?.progress)
    }

    pub async fn timestamp_delivered(&mut self) -> Result<i64> {
        if let Some(ts) = self.cache.timestamp_delivered {
            return Ok(ts);
        }
        Ok(self.hydrate().await?.timestamp_delivered)
    }

    pub async fn timestamp_displayed(&mut self) -> Result<i64> {
        if let Some(ts) = self.cache.timestamp_displayed {
            return Ok(ts);
        }
        Ok(self.hydrate().await?.timestamp_displayed)
    }

    /// Persist a state change; returns whether the row changed
    pub async fn set_state_and_reason(&mut self, state: SessionState, reason: ReasonCode) -> Result<bool> {
        let changed = self.store.update_state(&self.session_id, state, reason).await?;
        if state.is_terminal() {
            self.cache.final_state = Some((state, reason));
        }
        Ok(changed)
    }

    pub async fn set_progress(&mut self, current: u64) -> Result<bool> {
        Ok(self.store.update_progress(&self.session_id, current).await?)
    }

    pub async fn set_timestamp_delivered(&mut self, timestamp: i64) -> Result<bool> {
        let changed = self.store.set_timestamp_delivered(&self.session_id, timestamp).await?;
        if changed {
            self.cache.timestamp_delivered = Some(timestamp);
        }
        Ok(changed)
    }

    pub async fn set_timestamp_displayed(&mut self, timestamp: i64) -> Result<bool> {
        let changed = self.store.set_timestamp_displayed(&self.session_id, timestamp).await?;
        if changed {
            self.cache.timestamp_displayed = Some(timestamp);
        }
        Ok(changed)
    }
}

impl std::fmt::Debug for PersistedAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedAccessor")
            .field("session_id", &self.session_id)
            .field("cache", &self.cache)
            .finish()
    }
}
