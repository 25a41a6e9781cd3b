//! Error types for the sync engine.
//!
//! `BackendError` describes what went wrong talking to the sorter API.
//! `SyncError` is what engine operations hand back to callers; every I/O
//! failure is converted into one of its variants at the component that
//! issued the request.

use thiserror::Error;

use crate::auth::Action;
use crate::model::{ConsultationId, Partition};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    /// Used by non-HTTP backends (mocks, replays).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Server { status, .. } => Some(*status),
            BackendError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// What a failed fetch was trying to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    Partition(Partition),
    Keywords,
    Principal,
}

impl std::fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchTarget::Partition(p) => write!(f, "{p} partition"),
            FetchTarget::Keywords => f.write_str("keyword list"),
            FetchTarget::Principal => f.write_str("current user"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    /// Non-fatal; the previous snapshot stays in place.
    #[error("fetch of {target} failed: {source}")]
    FetchFailed {
        target: FetchTarget,
        #[source]
        source: BackendError,
    },

    /// Refused locally; no request was sent.
    #[error("{action} requires {}", .action.requirement())]
    Unauthorized { action: Action },

    #[error("feedback for consultation {id} failed: {source}")]
    FeedbackFailed {
        id: ConsultationId,
        #[source]
        source: BackendError,
    },

    /// Classification did not re-run on the server.
    #[error("refilter failed: {source}")]
    RefilterFailed {
        #[source]
        source: BackendError,
    },

    #[error("keyword update failed: {source}")]
    KeywordUpdateFailed {
        #[source]
        source: BackendError,
    },

    #[error("keyword text is empty")]
    EmptyKeyword,

    /// The session was stopped; nothing is sent any more.
    #[error("session is stopped")]
    SessionClosed,
}

impl SyncError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Unauthorized { .. })
    }
}

/// Convenience Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
