//! Test doubles for the protocol engine and API listeners
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rvoip_session_api::capability::{Capabilities, CapabilityEngine};
use rvoip_session_api::store::{PersistedStore, SessionRecord};
use rvoip_session_api::live::{LiveSession, LiveSessionLookup, OutgoingRequest, SessionEngine, SessionEventSink};
use rvoip_session_api::{
    ContactId, ContentInfo, EngineError, ListenerError, ServiceConfig, ServiceId, SessionEvent, SessionFacade,
    SessionId, SessionKind, SessionListener, SessionState, StoreError, TerminationReason,
};

/// Live session whose attributes are set by the test
pub struct MockLiveSession {
    id: SessionId,
    kind: SessionKind,
    contact: ContactId,
    incoming: bool,
    content: Option<ContentInfo>,
    service_id: Option<ServiceId>,
    max_message_size: usize,
    pub established: AtomicBool,
    pub accepted: AtomicBool,
    pub transferred: AtomicBool,
    pub fail_actions: AtomicBool,
    actions: Mutex<Vec<String>>,
    sinks: Mutex<Vec<Arc<dyn SessionEventSink>>>,
}

impl MockLiveSession {
    pub fn new(kind: SessionKind, contact: &str, incoming: bool) -> Self {
        Self {
            id: SessionId::new(),
            kind,
            contact: ContactId::parse(contact).unwrap(),
            incoming,
            content: None,
            service_id: None,
            max_message_size: 0,
            established: AtomicBool::new(false),
            accepted: AtomicBool::new(false),
            transferred: AtomicBool::new(false),
            fail_actions: AtomicBool::new(false),
            actions: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_content(mut self, content: ContentInfo) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_service_id(mut self, service_id: &str) -> Self {
        self.service_id = Some(ServiceId::parse(service_id).unwrap());
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id.clone()
    }

    /// The facade registered as event sink
    pub fn sink(&self) -> Arc<dyn SessionEventSink> {
        self.sinks.lock().first().cloned().expect("no event sink attached")
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().clone()
    }

    fn act(&self, action: impl Into<String>) -> Result<(), EngineError> {
        self.actions.lock().push(action.into());
        if self.fail_actions.load(Ordering::SeqCst) {
            Err(EngineError::Network("simulated failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LiveSession for MockLiveSession {
    fn session_id(&self) -> SessionId {
        self.id.clone()
    }

    fn kind(&self) -> SessionKind {
        self.kind
    }

    fn remote_contact(&self) -> Option<ContactId> {
        Some(self.contact.clone())
    }

    fn is_initiated_by_remote(&self) -> bool {
        self.incoming
    }

    fn is_dialog_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::SeqCst)
    }

    fn is_content_transferred(&self) -> bool {
        self.transferred.load(Ordering::SeqCst)
    }

    fn content(&self) -> Option<ContentInfo> {
        self.content.clone()
    }

    fn service_id(&self) -> Option<ServiceId> {
        self.service_id.clone()
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    fn timestamp(&self) -> i64 {
        1_700_000_000_000
    }

    fn add_event_sink(&self, sink: Arc<dyn SessionEventSink>) {
        self.sinks.lock().push(sink);
    }

    async fn start(&self) -> Result<(), EngineError> {
        self.act("start")
    }

    async fn accept(&self) -> Result<(), EngineError> {
        self.act("accept")?;
        self.accepted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&self, reason: TerminationReason) -> Result<(), EngineError> {
        self.act(format!("reject {:?}", reason))
    }

    async fn terminate(&self, reason: TerminationReason) -> Result<(), EngineError> {
        self.act(format!("terminate {:?}", reason))
    }

    async fn send_data(&self, data: Bytes) -> Result<(), EngineError> {
        self.act(format!("send {}", data.len()))
    }
}

/// Engine tracking mock live sessions by id
#[derive(Default)]
pub struct MockEngine {
    pub registered: AtomicBool,
    sessions: DashMap<SessionId, Arc<MockLiveSession>>,
    pub fail_start: AtomicBool,
}

impl MockEngine {
    pub fn registered() -> Arc<Self> {
        let engine = Self::default();
        engine.registered.store(true, Ordering::SeqCst);
        Arc::new(engine)
    }

    pub fn add(&self, session: MockLiveSession) -> Arc<MockLiveSession> {
        let session = Arc::new(session);
        self.sessions.insert(session.id(), session.clone());
        session
    }

    pub fn session(&self, id: &SessionId) -> Arc<MockLiveSession> {
        self.sessions.get(id).map(|s| s.value().clone()).expect("unknown mock session")
    }

    /// Simulate the engine dropping its live session
    pub fn drop_session(&self, id: &SessionId) {
        self.sessions.remove(id);
    }
}

impl LiveSessionLookup for MockEngine {
    fn lookup(&self, id: &SessionId) -> Option<Arc<dyn LiveSession>> {
        self.sessions.get(id).map(|s| s.value().clone() as Arc<dyn LiveSession>)
    }
}

#[async_trait]
impl SessionEngine for MockEngine {
    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn initiate(&self, request: OutgoingRequest) -> Result<Arc<dyn LiveSession>, EngineError> {
        let mut session = MockLiveSession::new(request.kind, request.contact.as_str(), false);
        session.content = request.content;
        session.service_id = request.service_id;
        if self.fail_start.load(Ordering::SeqCst) {
            session.fail_actions.store(true, Ordering::SeqCst);
        }
        Ok(self.add(session))
    }
}

/// Listener recording every event it receives
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionListener for RecordingListener {
    async fn on_event(&self, event: &SessionEvent) -> Result<(), ListenerError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Listener that reads the facade's stored progress while handling each update
pub struct QueryingListener {
    facade: Arc<SessionFacade>,
    delay: Duration,
    seen: Mutex<Vec<(u64, u64)>>,
}

impl QueryingListener {
    pub fn new(facade: Arc<SessionFacade>, delay: Duration) -> Self {
        Self {
            facade,
            delay,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Pairs of (progress in the event, progress read back from the facade)
    pub fn seen(&self) -> Vec<(u64, u64)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl SessionListener for QueryingListener {
    async fn on_event(&self, event: &SessionEvent) -> Result<(), ListenerError> {
        if let SessionEvent::ProgressUpdate { current, .. } = event {
            tokio::time::sleep(self.delay).await;
            let stored = self
                .facade
                .get_progress()
                .await
                .map_err(|e| ListenerError::Failed(e.to_string()))?;
            self.seen.lock().push((*current, stored));
        }
        Ok(())
    }
}

/// Store that has no rows and refuses every write
#[derive(Default)]
pub struct FailingStore;

#[async_trait]
impl PersistedStore for FailingStore {
    async fn read(&self, _id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(None)
    }

    async fn write(&self, _id: &SessionId, _record: SessionRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }
}

/// Capability engine answering from a fixed table
#[derive(Default)]
pub struct MockCapabilityEngine {
    pub contacts: Vec<ContactId>,
    pub requests: AtomicUsize,
    pub unreachable: Option<ContactId>,
}

#[async_trait]
impl CapabilityEngine for MockCapabilityEngine {
    fn is_registered(&self) -> bool {
        true
    }

    async fn request_capabilities(&self, contact: &ContactId) -> Result<Capabilities, EngineError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.as_ref() == Some(contact) {
            return Err(EngineError::Network(format!("{} unreachable", contact)));
        }
        Ok(Capabilities {
            image_sharing: true,
            chat: true,
            ..Default::default()
        })
    }

    async fn all_contacts(&self) -> Result<Vec<ContactId>, EngineError> {
        Ok(self.contacts.clone())
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig::default()
        .with_queue_capacity(16)
        .with_dispatch_timeout(Duration::from_secs(1))
}

pub fn image() -> ContentInfo {
    ContentInfo::new("file:///sdcard/cat.jpg", "cat.jpg", "image/jpeg", 2048)
}

/// Poll `check` until it holds or two seconds elapse
pub async fn wait_until<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
