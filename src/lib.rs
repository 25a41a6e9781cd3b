// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;

// Engine components
pub mod feedback;
pub mod highlight;
pub mod keywords;
pub mod poller;
pub mod refilter;
pub mod session;
pub mod store;
pub mod sync;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::backend::{Backend, HttpBackend, MockBackend};
pub use crate::config::SyncConfig;
pub use crate::error::{BackendError, SyncError};
pub use crate::feedback::FeedbackOutcome;
pub use crate::model::{
    ConsultationId, ConsultationRecord, Decision, Keyword, Partition, Principal,
};
pub use crate::poller::RefreshOutcome;
pub use crate::session::{Session, SessionConfig};
pub use crate::sync::{PartitionSnapshot, SyncEvent};
