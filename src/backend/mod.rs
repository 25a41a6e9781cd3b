// src/backend/mod.rs
pub mod http;
pub mod mock;

use crate::error::BackendError;
use crate::model::{ConsultationRecord, FeedbackEvent, Keyword, Partition, Principal};

pub use http::HttpBackend;
pub use mock::MockBackend;

/// Request/response contract of the sorter API. The engine treats it as a
/// black box: it never retries, and it converts every error it sees.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_partition(
        &self,
        partition: Partition,
    ) -> Result<Vec<ConsultationRecord>, BackendError>;

    async fn list_keywords(&self) -> Result<Vec<Keyword>, BackendError>;

    async fn add_keyword(&self, text: &str) -> Result<(), BackendError>;

    async fn delete_keyword(&self, id: i64) -> Result<(), BackendError>;

    async fn submit_feedback(&self, event: &FeedbackEvent) -> Result<(), BackendError>;

    async fn refilter(&self) -> Result<(), BackendError>;

    async fn current_principal(&self) -> Result<Principal, BackendError>;

    /// Whether requests carry a bearer token at all.
    fn has_credentials(&self) -> bool;

    fn name(&self) -> &'static str;
}
