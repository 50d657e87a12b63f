//! # Session API - Stable facades over ephemeral sessions
//!
//! The protocol engine creates and destroys live sessions (image, video and
//! geolocation sharing, multimedia messaging and streaming, file uploads) as
//! the network dictates. API consumers instead hold a [`SessionFacade`] per
//! session id, which keeps answering after the live session is gone by falling
//! back to the persisted record.
//!
//! ## Components
//!
//! - [`translator`]: protocol termination and error codes to public state
//! - [`accessor::PersistedAccessor`]: read-through cache over one record
//! - [`events::EventBroadcaster`]: listener fan-out with lazy removal
//! - [`SessionFacade`]: queries, control operations and engine callbacks
//! - [`SessionRegistry`]: at most one live facade per session id
//! - [`OperationScheduler`]: serialized background work with fault isolation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rvoip_session_api::{ServiceConfig, SessionKind, SessionService, MemoryStore, ContentInfo};
//! # use rvoip_session_api::live::SessionEngine;
//! # use std::sync::Arc;
//! # async fn example<E: SessionEngine + 'static>(engine: Arc<E>) -> rvoip_session_api::Result<()> {
//! let config = ServiceConfig::from_toml_str("queue_capacity = 16")?;
//! let service = SessionService::new(
//!     SessionKind::ImageSharing,
//!     &config,
//!     engine,
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let content = ContentInfo::new("file:///tmp/cat.jpg", "cat.jpg", "image/jpeg", 4096);
//! let session = service.initiate_session("+33612345678", Some(content), None).await?;
//! println!("{} is {}", session.id(), session.get_state().await?);
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod auth;
pub mod capability;
pub mod config;
pub mod errors;
pub mod events;
pub mod facade;
pub mod live;
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod state_graph;
pub mod store;
pub mod translator;
pub mod types;

pub use capability::{Capabilities, CapabilityEngine, CapabilityService};
pub use config::ServiceConfig;
pub use errors::{EngineError, ListenerError, Result, ServiceError, StoreError};
pub use events::{EventBroadcaster, ListenerId, ListenerScope, SessionEvent, SessionListener};
pub use facade::SessionFacade;
pub use registry::SessionRegistry;
pub use scheduler::OperationScheduler;
pub use service::{ServiceSettings, SessionService};
pub use store::{MemoryStore, PersistedStore, SessionRecord};
pub use translator::{ProtocolCode, StateAndReason, TerminationReason};
pub use types::{ContactId, ContentInfo, Direction, ReasonCode, ServiceId, SessionId, SessionKind, SessionState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
