//! Registry of facades with a live session
//!
//! Holds at most one facade per session id. An entry exists exactly while the
//! session has a live counterpart in the protocol engine; facades remove
//! themselves when they reach a terminal state. Map guards are never held
//! across an `.await`, so callers are free to publish or persist right after a
//! registry call.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::errors::{Result, ServiceError};
use crate::facade::SessionFacade;
use crate::types::{SessionId, SessionKind};

/// Counters kept for diagnostics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub active: usize,
    pub total_registered: usize,
    pub total_removed: usize,
}

#[derive(Debug)]
pub struct SessionRegistry {
    kind: SessionKind,
    sessions: DashMap<SessionId, Arc<SessionFacade>>,
    total_registered: AtomicUsize,
    total_removed: AtomicUsize,
}

impl SessionRegistry {
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            sessions: DashMap::new(),
            total_registered: AtomicUsize::new(0),
            total_removed: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Insert a facade; fails with `AlreadyExists` if the id is taken
    pub fn put(&self, id: SessionId, facade: Arc<SessionFacade>) -> Result<()> {
        match self.sessions.entry(id) {
            Entry::Occupied(entry) => Err(ServiceError::already_exists(entry.key().to_string())),
            Entry::Vacant(entry) => {
                debug!(kind = %self.kind, session_id = %entry.key(), "Registered session");
                entry.insert(facade);
                self.total_registered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionFacade>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Remove a facade; absent ids are a no-op returning `None`
    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionFacade>> {
        let removed = self.sessions.remove(id).map(|(_, facade)| facade);
        if removed.is_some() {
            self.total_removed.fetch_add(1, Ordering::Relaxed);
            debug!(kind = %self.kind, session_id = %id, "Removed session");
        }
        removed
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Snapshot of the registered facades
    pub fn list(&self) -> Vec<Arc<SessionFacade>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every entry (service shutdown)
    pub fn clear(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        debug!(kind = %self.kind, count, "Cleared registry");
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active: self.sessions.len(),
            total_registered: self.total_registered.load(Ordering::Relaxed),
            total_removed: self.total_removed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBroadcaster;
    use crate::facade::FacadeContext;
    use crate::scheduler::OperationScheduler;
    use crate::store::MemoryStore;
    use crate::auth::AllowAll;
    use crate::live::{LiveSession, LiveSessionLookup};

    struct NoLive;

    impl LiveSessionLookup for NoLive {
        fn lookup(&self, _id: &SessionId) -> Option<Arc<dyn LiveSession>> {
            None
        }
    }

    fn facade(registry: &Arc<SessionRegistry>, id: &str) -> Arc<SessionFacade> {
        let context = FacadeContext {
            kind: SessionKind::ImageSharing,
            registry: Arc::downgrade(registry),
            lookup: Arc::new(NoLive),
            store: Arc::new(MemoryStore::new()),
            broadcaster: Arc::new(EventBroadcaster::default()),
            scheduler: Arc::new(OperationScheduler::new("test", 4)),
            authorization: Arc::new(AllowAll),
            default_max_message_size: 0,
        };
        SessionFacade::new(SessionId::from(id), context)
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let registry = Arc::new(SessionRegistry::new(SessionKind::ImageSharing));
        let id = SessionId::from("r1");
        let first = facade(&registry, "r1");

        registry.put(id.clone(), first.clone()).unwrap();
        assert!(Arc::ptr_eq(&registry.get(&id).unwrap(), &first));

        let duplicate = registry.put(id.clone(), facade(&registry, "r1"));
        assert!(matches!(duplicate, Err(ServiceError::AlreadyExists { .. })));

        assert!(registry.remove(&id).is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.remove(&id).is_none());

        let stats = registry.stats();
        assert_eq!(stats, RegistryStats { active: 0, total_registered: 1, total_removed: 1 });
    }

    #[tokio::test]
    async fn test_list_is_snapshot() {
        let registry = Arc::new(SessionRegistry::new(SessionKind::ImageSharing));
        registry.put(SessionId::from("a"), facade(&registry, "a")).unwrap();
        registry.put(SessionId::from("b"), facade(&registry, "b")).unwrap();

        let snapshot = registry.list();
        registry.clear();
        assert_eq!(snapshot.len(), 2);
        assert!(registry.is_empty());
    }
}
