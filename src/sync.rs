// src/sync.rs
//! Per-session partition state and the refresh path that feeds it:
//! fetch → Record Store (replace snapshot) → Highlight Tracker → observers.
//!
//! Locks are never held across an await; all snapshot and highlight
//! mutation happens synchronously once a response is in hand.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::backend::Backend;
use crate::error::{FetchTarget, SyncError};
use crate::highlight::HighlightTracker;
use crate::model::{ByPartition, ConsultationId, ConsultationRecord, Decision, Partition};
use crate::poller::{PartitionRefresher, RefreshOutcome};
use crate::store::{Reconciliation, RecordStore};

/// Notifications for UI observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    SnapshotApplied {
        partition: Partition,
        seq: u64,
        total: usize,
        new_ids: Vec<ConsultationId>,
        banner: bool,
    },
    HighlightExpired {
        partition: Partition,
    },
    FetchFailed {
        partition: Partition,
        message: String,
    },
    Reconciled {
        partition: Partition,
        id: ConsultationId,
    },
    Reverted {
        partition: Partition,
        id: ConsultationId,
    },
    KeywordsChanged {
        count: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewRecord {
    #[serde(flatten)]
    pub record: ConsultationRecord,
    pub is_new: bool,
}

/// Read model of one partition as an observer should render it.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionSnapshot {
    pub partition: Partition,
    pub records: Vec<ViewRecord>,
    pub banner: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub applied_seq: u64,
    pub pending_removals: usize,
}

pub struct PartitionView {
    pub(crate) store: RecordStore,
    pub(crate) tracker: HighlightTracker,
    expiry: Option<JoinHandle<()>>,
}

impl PartitionView {
    fn new(partition: Partition, ttl: Duration) -> Self {
        Self {
            store: RecordStore::new(partition),
            tracker: HighlightTracker::new(ttl),
            expiry: None,
        }
    }
}

type SharedView = Arc<Mutex<PartitionView>>;

fn lock(view: &SharedView) -> MutexGuard<'_, PartitionView> {
    view.lock().expect("partition view mutex poisoned")
}

pub struct SyncState {
    backend: Arc<dyn Backend>,
    views: ByPartition<SharedView>,
    events: broadcast::Sender<SyncEvent>,
    closed: AtomicBool,
}

impl SyncState {
    pub fn new(backend: Arc<dyn Backend>, highlight_ttl: Duration, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            backend,
            views: ByPartition::from_fn(|p| {
                Arc::new(Mutex::new(PartitionView::new(p, highlight_ttl)))
            }),
            events,
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear down: pending TTL timers are cancelled and responses still in
    /// flight are dropped on arrival.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for (_, view) in self.views.iter() {
            if let Some(handle) = lock(view).expiry.take() {
                handle.abort();
            }
        }
    }

    pub fn visible(&self, partition: Partition) -> Vec<ConsultationRecord> {
        lock(self.views.get(partition)).store.visible()
    }

    pub fn highlighted(&self, partition: Partition) -> HashSet<ConsultationId> {
        lock(self.views.get(partition)).tracker.highlighted(Instant::now())
    }

    pub fn banner(&self, partition: Partition) -> bool {
        lock(self.views.get(partition)).tracker.banner(Instant::now())
    }

    pub fn snapshot(&self, partition: Partition) -> PartitionSnapshot {
        let now = Instant::now();
        let view = lock(self.views.get(partition));
        let records = view
            .store
            .visible()
            .into_iter()
            .map(|record| ViewRecord {
                is_new: view.tracker.is_highlighted(&record.consultation_id, now),
                record,
            })
            .collect();
        PartitionSnapshot {
            partition,
            records,
            banner: view.tracker.banner(now),
            fetched_at: view.store.fetched_at(),
            applied_seq: view.store.applied_seq(),
            pending_removals: view.store.pending_removals(),
        }
    }

    /// DISPLAYED -> SUBMITTING in whichever partition currently shows `id`.
    pub(crate) fn begin_submit(
        &self,
        id: &ConsultationId,
    ) -> Option<(Partition, ConsultationRecord)> {
        Partition::ALL.into_iter().find_map(|p| {
            lock(self.views.get(p))
                .store
                .begin_submit(id)
                .map(|record| (p, record))
        })
    }

    pub(crate) fn confirm_removal(
        &self,
        partition: Partition,
        id: &ConsultationId,
        decision: Decision,
    ) {
        lock(self.views.get(partition))
            .store
            .confirm_removal(id, decision);
    }

    pub(crate) fn abort_submit(&self, partition: Partition, id: &ConsultationId) {
        lock(self.views.get(partition)).store.abort_submit(id);
    }

    fn apply_snapshot(
        &self,
        partition: Partition,
        view_arc: &SharedView,
        seq: u64,
        records: Vec<ConsultationRecord>,
    ) -> RefreshOutcome {
        let now = Instant::now();
        let mut view = lock(view_arc);

        let Some(applied) = view.store.apply(seq, records, Utc::now()) else {
            counter!("sync_stale_responses_total", "partition" => partition.as_str()).increment(1);
            tracing::debug!(
                target: "sync",
                %partition,
                seq,
                applied = view.store.applied_seq(),
                "discarding out-of-order response"
            );
            return RefreshOutcome::Stale { seq };
        };

        let obs = view
            .tracker
            .observe(applied.previous_ids.as_ref(), &applied.current_ids, now);

        if let Some(generation) = obs.generation {
            let handle = self.schedule_expiry(partition, view_arc, generation, view.tracker.ttl());
            if let Some(old) = view.expiry.replace(handle) {
                old.abort();
            }
        }

        let total = view.store.visible_len();
        drop(view);

        gauge!("sync_snapshot_records", "partition" => partition.as_str())
            .set(applied.current_ids.len() as f64);

        for r in applied.reconciliations {
            match r {
                Reconciliation::Reconciled(id) => {
                    tracing::debug!(
                        target: "feedback",
                        %partition,
                        %id,
                        "move confirmed by server"
                    );
                    self.emit(SyncEvent::Reconciled { partition, id });
                }
                Reconciliation::Reverted(id) => {
                    counter!("feedback_reverted_total").increment(1);
                    tracing::warn!(
                        target: "feedback",
                        %partition,
                        %id,
                        "server kept the record after feedback; showing it again"
                    );
                    self.emit(SyncEvent::Reverted { partition, id });
                }
            }
        }

        let mut new_ids: Vec<ConsultationId> = obs.new_ids.into_iter().collect();
        new_ids.sort();
        if new_ids.is_empty() {
            tracing::trace!(target: "sync", %partition, seq, total, "snapshot applied");
        } else {
            counter!("sync_new_records_total", "partition" => partition.as_str())
                .increment(new_ids.len() as u64);
            tracing::info!(
                target: "sync",
                %partition,
                seq,
                total,
                new = new_ids.len(),
                banner = obs.banner,
                "new records"
            );
        }

        let new = new_ids.len();
        self.emit(SyncEvent::SnapshotApplied {
            partition,
            seq,
            total,
            new_ids,
            banner: obs.banner,
        });
        RefreshOutcome::Applied { seq, total, new }
    }

    fn schedule_expiry(
        &self,
        partition: Partition,
        view_arc: &SharedView,
        generation: u64,
        ttl: Duration,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(view_arc);
        let events = self.events.clone();
        tokio::spawn(async move {
            time::sleep(ttl).await;
            let Some(view) = weak.upgrade() else {
                return;
            };
            let cleared = lock(&view).tracker.expire(generation);
            if cleared {
                tracing::debug!(target: "sync", %partition, generation, "highlight expired");
                let _ = events.send(SyncEvent::HighlightExpired { partition });
            }
        })
    }
}

#[async_trait::async_trait]
impl PartitionRefresher for SyncState {
    async fn refresh(&self, partition: Partition) -> Result<RefreshOutcome, SyncError> {
        if self.is_closed() {
            return Ok(RefreshOutcome::Ignored);
        }

        let view = self.views.get(partition).clone();
        let seq = lock(&view).store.begin_fetch();
        counter!("sync_fetch_total", "partition" => partition.as_str()).increment(1);

        let fetched = self.backend.fetch_partition(partition).await;

        if self.is_closed() {
            tracing::debug!(target: "sync", %partition, seq, "session closed; response ignored");
            return Ok(RefreshOutcome::Ignored);
        }

        match fetched {
            Ok(records) => Ok(self.apply_snapshot(partition, &view, seq, records)),
            Err(source) => {
                counter!("sync_fetch_errors_total", "partition" => partition.as_str()).increment(1);
                tracing::warn!(
                    target: "sync",
                    %partition,
                    seq,
                    error = %source,
                    "fetch failed; keeping last snapshot"
                );
                self.emit(SyncEvent::FetchFailed {
                    partition,
                    message: source.to_string(),
                });
                Err(SyncError::FetchFailed {
                    target: FetchTarget::Partition(partition),
                    source,
                })
            }
        }
    }
}
