// src/keywords.rs
//! Keyword Registry. The keyword set drives future classification only;
//! after a change both partitions are re-synced, and records already
//! classified stay where they are until a refilter.

use std::sync::{Arc, RwLock};

use metrics::counter;

use crate::auth::{self, Action};
use crate::backend::Backend;
use crate::error::{FetchTarget, Result, SyncError};
use crate::model::{Keyword, Principal};
use crate::poller::PollerSet;
use crate::sync::{SyncEvent, SyncState};

pub struct KeywordRegistry {
    backend: Arc<dyn Backend>,
    state: Arc<SyncState>,
    pollers: Arc<PollerSet>,
    principal: Principal,
    cache: RwLock<Vec<Keyword>>,
}

impl KeywordRegistry {
    pub fn new(
        backend: Arc<dyn Backend>,
        state: Arc<SyncState>,
        pollers: Arc<PollerSet>,
        principal: Principal,
    ) -> Self {
        Self {
            backend,
            state,
            pollers,
            principal,
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Reload from the server. On failure the cached list is kept.
    pub async fn list(&self) -> Result<Vec<Keyword>> {
        match self.backend.list_keywords().await {
            Ok(keywords) => {
                tracing::debug!(target: "keywords", count = keywords.len(), "keywords loaded");
                *self.cache.write().expect("keyword cache poisoned") = keywords.clone();
                Ok(keywords)
            }
            Err(source) => {
                tracing::warn!(
                    target: "keywords",
                    error = %source,
                    "keyword fetch failed; keeping cached list"
                );
                Err(SyncError::FetchFailed {
                    target: FetchTarget::Keywords,
                    source,
                })
            }
        }
    }

    /// Last successfully loaded list, in server order.
    pub fn cached(&self) -> Vec<Keyword> {
        self.cache.read().expect("keyword cache poisoned").clone()
    }

    pub async fn add(&self, text: &str) -> Result<()> {
        auth::require(&self.principal, Action::AddKeyword)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::EmptyKeyword);
        }

        self.backend
            .add_keyword(text)
            .await
            .map_err(|source| {
                tracing::warn!(target: "keywords", keyword = text, error = %source, "add failed");
                SyncError::KeywordUpdateFailed { source }
            })?;

        counter!("keyword_mutations_total", "op" => "add").increment(1);
        tracing::info!(target: "keywords", keyword = text, "keyword added");
        self.after_mutation().await;
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> Result<()> {
        auth::require(&self.principal, Action::RemoveKeyword)?;

        self.backend.delete_keyword(id).await.map_err(|source| {
            tracing::warn!(target: "keywords", id, error = %source, "delete failed");
            SyncError::KeywordUpdateFailed { source }
        })?;

        counter!("keyword_mutations_total", "op" => "remove").increment(1);
        tracing::info!(target: "keywords", id, "keyword removed");
        self.after_mutation().await;
        Ok(())
    }

    async fn after_mutation(&self) {
        // The mutation already succeeded; a failed reload only leaves the cache stale.
        if let Ok(keywords) = self.list().await {
            self.state.emit(SyncEvent::KeywordsChanged {
                count: keywords.len(),
            });
        }
        self.pollers.force_refresh_all();
    }
}
