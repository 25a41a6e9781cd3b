// src/refilter.rs
use std::sync::Arc;

use metrics::counter;

use crate::auth::{self, Action};
use crate::backend::Backend;
use crate::error::{Result, SyncError};
use crate::model::Principal;
use crate::poller::PollerSet;

/// Asks the server to re-run classification over existing records with the
/// current keyword set, then re-syncs both partitions.
pub struct RefilterTrigger {
    backend: Arc<dyn Backend>,
    pollers: Arc<PollerSet>,
    principal: Principal,
}

impl RefilterTrigger {
    pub fn new(backend: Arc<dyn Backend>, pollers: Arc<PollerSet>, principal: Principal) -> Self {
        Self {
            backend,
            pollers,
            principal,
        }
    }

    pub async fn refilter(&self) -> Result<()> {
        auth::require(&self.principal, Action::Refilter)?;

        if let Err(source) = self.backend.refilter().await {
            counter!("refilter_errors_total").increment(1);
            tracing::warn!(
                target: "sync",
                error = %source,
                "refilter failed; classification did not re-run"
            );
            return Err(SyncError::RefilterFailed { source });
        }

        counter!("refilter_total").increment(1);
        tracing::info!(target: "sync", "refilter accepted; re-syncing partitions");
        self.pollers.force_refresh_all();
        Ok(())
    }
}
