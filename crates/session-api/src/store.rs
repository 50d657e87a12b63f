//! Durable session records
//!
//! One [`SessionRecord`] row exists per session id. Rows are created on the
//! first persistence write and are never deleted by this crate, so history stays
//! queryable after the live session is gone.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::StoreError;
use crate::types::{ContactId, ContentInfo, Direction, ReasonCode, ServiceId, SessionId, SessionKind, SessionState};

/// Persisted attributes of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub state: SessionState,
    pub reason_code: ReasonCode,
    pub direction: Direction,
    pub contact: Option<ContactId>,
    pub content: Option<ContentInfo>,
    pub service_id: Option<ServiceId>,
    pub chat_id: Option<String>,
    /// Bytes transferred so far
    pub progress: u64,
    /// Creation (outgoing) or invitation (incoming) time, epoch millis
    pub timestamp: i64,
    /// 0 until delivery is reported
    pub timestamp_delivered: i64,
    /// 0 until display is reported
    pub timestamp_displayed: i64,
}

impl SessionRecord {
    pub fn new(
        session_id: SessionId,
        kind: SessionKind,
        direction: Direction,
        state: SessionState,
        timestamp: i64,
    ) -> Self {
        Self {
            session_id,
            kind,
            state,
            reason_code: ReasonCode::Unspecified,
            direction,
            contact: None,
            content: None,
            service_id: None,
            chat_id: None,
            progress: 0,
            timestamp,
            timestamp_delivered: 0,
            timestamp_displayed: 0,
        }
    }

    pub fn with_contact(mut self, contact: ContactId) -> Self {
        self.contact = Some(contact);
        self
    }

    pub fn with_content(mut self, content: Option<ContentInfo>) -> Self {
        self.content = content;
        self
    }

    pub fn with_service_id(mut self, service_id: Option<ServiceId>) -> Self {
        self.service_id = service_id;
        self
    }

    pub fn with_reason(mut self, reason_code: ReasonCode) -> Self {
        self.reason_code = reason_code;
        self
    }
}

/// Storage backend for session records
///
/// Implementations must make a completed `write` visible to every later `read`
/// from any task. The provided update methods do a read-modify-write and report
/// whether the row actually changed; backends with native conditional updates
/// should override them.
#[async_trait]
pub trait PersistedStore: Send + Sync {
    /// Read the row for `id`, if any
    async fn read(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace the row for `id`
    async fn write(&self, id: &SessionId, record: SessionRecord) -> Result<(), StoreError>;

    /// Update state and reason; `Ok(false)` when both already hold these values
    async fn update_state(
        &self,
        id: &SessionId,
        state: SessionState,
        reason_code: ReasonCode,
    ) -> Result<bool, StoreError> {
        let mut record = self.read(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.state == state && record.reason_code == reason_code {
            return Ok(false);
        }
        record.state = state;
        record.reason_code = reason_code;
        self.write(id, record).await?;
        Ok(true)
    }

    /// Update transfer progress; `Ok(false)` when unchanged
    async fn update_progress(&self, id: &SessionId, current: u64) -> Result<bool, StoreError> {
        let mut record = self.read(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.progress == current {
            return Ok(false);
        }
        record.progress = current;
        self.write(id, record).await?;
        Ok(true)
    }

    /// Record the delivery time once; later calls leave it untouched
    async fn set_timestamp_delivered(&self, id: &SessionId, timestamp: i64) -> Result<bool, StoreError> {
        let mut record = self.read(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.timestamp_delivered != 0 {
            return Ok(false);
        }
        record.timestamp_delivered = timestamp;
        self.write(id, record).await?;
        Ok(true)
    }

    /// Record the display time once; later calls leave it untouched
    async fn set_timestamp_displayed(&self, id: &SessionId, timestamp: i64) -> Result<bool, StoreError> {
        let mut record = self.read(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.timestamp_displayed != 0 {
            return Ok(false);
        }
        record.timestamp_displayed = timestamp;
        self.write(id, record).await?;
        Ok(true)
    }
}

/// In-process store keyed by session id
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    rows: Arc<DashMap<SessionId, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, failing if one already exists
    pub fn insert(&self, record: SessionRecord) -> Result<(), StoreError> {
        match self.rows.entry(record.session_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(record.session_id.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Snapshot of every row for `kind`
    pub fn records_of_kind(&self, kind: SessionKind) -> Vec<SessionRecord> {
        self.rows
            .iter()
            .filter(|row| row.kind == kind)
            .map(|row| row.value().clone())
            .collect()
    }
}

#[async_trait]
impl PersistedStore for MemoryStore {
    async fn read(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.rows.get(id).map(|row| row.value().clone()))
    }

    async fn write(&self, id: &SessionId, record: SessionRecord) -> Result<(), StoreError> {
        self.rows.insert(id.clone(), record);
        Ok(())
    }

    async fn update_state(
        &self,
        id: &SessionId,
        state: SessionState,
        reason_code: ReasonCode,
    ) -> Result<bool, StoreError> {
        let mut row = self.rows.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if row.state == state && row.reason_code == reason_code {
            return Ok(false);
        }
        row.state = state;
        row.reason_code = reason_code;
        Ok(true)
    }

    async fn update_progress(&self, id: &SessionId, current: u64) -> Result<bool, StoreError> {
        let mut row = self.rows.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if row.progress == current {
            return Ok(false);
        }
        row.progress = current;
        Ok(true)
    }
}
