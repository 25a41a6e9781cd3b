// src/session.rs
//! A view session: owns its partition state, timers and sequence counters.
//! Nothing here is process-global, so sessions (and tests) never interfere.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::auth;
use crate::backend::Backend;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::feedback::{FeedbackOutcome, FeedbackSubmitter};
use crate::highlight::DEFAULT_HIGHLIGHT_TTL;
use crate::keywords::KeywordRegistry;
use crate::model::{ConsultationId, ConsultationRecord, Decision, Keyword, Partition, Principal};
use crate::poller::{PartitionRefresher, PollerSet, RefreshOutcome};
use crate::refilter::RefilterTrigger;
use crate::sync::{PartitionSnapshot, SyncEvent, SyncState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub highlight_ttl: Duration,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(40 * 60),
            highlight_ttl: DEFAULT_HIGHLIGHT_TTL,
            event_capacity: 256,
        }
    }
}

impl From<&SyncConfig> for SessionConfig {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            highlight_ttl: Duration::from_secs(cfg.highlight_ttl_secs),
            ..Self::default()
        }
    }
}

pub struct Session {
    state: Arc<SyncState>,
    pollers: Arc<PollerSet>,
    keywords: KeywordRegistry,
    feedback: FeedbackSubmitter,
    refilter: RefilterTrigger,
    principal: Principal,
    config: SessionConfig,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, principal: Principal, config: SessionConfig) -> Self {
        crate::metrics::ensure_metrics_described();

        let state = Arc::new(SyncState::new(
            backend.clone(),
            config.highlight_ttl,
            config.event_capacity,
        ));
        let pollers = Arc::new(PollerSet::new());

        Self {
            keywords: KeywordRegistry::new(
                backend.clone(),
                state.clone(),
                pollers.clone(),
                principal.clone(),
            ),
            feedback: FeedbackSubmitter::new(
                backend.clone(),
                state.clone(),
                pollers.clone(),
                principal.clone(),
            ),
            refilter: RefilterTrigger::new(backend, pollers.clone(), principal.clone()),
            state,
            pollers,
            principal,
            config,
        }
    }

    /// Build a session for whoever the backend's credentials belong to.
    pub async fn connect(backend: Arc<dyn Backend>, config: SessionConfig) -> Self {
        let principal = auth::resolve_principal(backend.as_ref()).await;
        Self::new(backend, principal, config)
    }

    /// Activate the view: start both pollers (each fetches immediately) and
    /// load the keyword list once.
    pub async fn start(&self) {
        let refresher: Arc<dyn PartitionRefresher> = self.state.clone();
        self.pollers.start_all(refresher, self.config.poll_interval);
        // Failure is logged by the registry; the view runs with an empty list.
        let _ = self.keywords.list().await;
    }

    /// Tear down: timers cleared, late responses ignored. Final.
    pub fn stop(&self) {
        self.pollers.stop_all();
        self.state.close();
    }

    pub fn is_running(&self) -> bool {
        Partition::ALL
            .into_iter()
            .any(|p| self.pollers.get(p).is_running())
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.state.subscribe()
    }

    /// Fetch one partition now and wait for the result. Independent of the
    /// poller; ordering is still guaranteed by sequence numbers.
    pub async fn refresh(&self, partition: Partition) -> Result<RefreshOutcome> {
        self.state.refresh(partition).await
    }

    /// Ask the running poller for an out-of-band fetch.
    pub fn force_refresh(&self, partition: Partition) -> bool {
        self.pollers.force_refresh(partition)
    }

    pub fn visible(&self, partition: Partition) -> Vec<ConsultationRecord> {
        self.state.visible(partition)
    }

    pub fn snapshot(&self, partition: Partition) -> PartitionSnapshot {
        self.state.snapshot(partition)
    }

    pub fn highlighted(&self, partition: Partition) -> HashSet<ConsultationId> {
        self.state.highlighted(partition)
    }

    pub fn banner(&self, partition: Partition) -> bool {
        self.state.banner(partition)
    }

    pub fn keywords(&self) -> &KeywordRegistry {
        &self.keywords
    }

    pub fn cached_keywords(&self) -> Vec<Keyword> {
        self.keywords.cached()
    }

    pub async fn list_keywords(&self) -> Result<Vec<Keyword>> {
        self.keywords.list().await
    }

    pub async fn add_keyword(&self, text: &str) -> Result<()> {
        self.keywords.add(text).await
    }

    pub async fn remove_keyword(&self, id: i64) -> Result<()> {
        self.keywords.remove(id).await
    }

    pub async fn submit_feedback(
        &self,
        record: &ConsultationRecord,
        decision: Decision,
    ) -> Result<FeedbackOutcome> {
        self.feedback.submit(record, decision).await
    }

    pub async fn submit_feedback_for(
        &self,
        id: &ConsultationId,
        decision: Decision,
    ) -> Result<FeedbackOutcome> {
        self.feedback.submit_id(id, decision).await
    }

    pub async fn refilter(&self) -> Result<()> {
        self.refilter.refilter().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
