// src/poller.rs
//! Periodic, cancellable refresh task per partition.
//!
//! The loop awaits each refresh before looking at the timer again, so a
//! partition never has two poller fetches in flight. `force_refresh` stores a
//! single `Notify` permit: issued while a fetch is running, it turns into
//! exactly one more fetch right after that one resolves, however many times
//! it was called.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::SyncError;
use crate::model::{ByPartition, Partition};

/// How a refresh ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { seq: u64, total: usize, new: usize },
    /// A newer snapshot was already in place.
    Stale { seq: u64 },
    /// The session was closed while the request was out.
    Ignored,
}

#[async_trait::async_trait]
pub trait PartitionRefresher: Send + Sync + 'static {
    async fn refresh(&self, partition: Partition) -> Result<RefreshOutcome, SyncError>;
}

pub struct Poller {
    partition: Partition,
    trigger: Arc<Notify>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            trigger: Arc::new(Notify::new()),
            task: Mutex::new(None),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Fetch now, then every `interval`, until `stop`. Restarts the loop if
    /// it was already running.
    pub fn start(&self, refresher: Arc<dyn PartitionRefresher>, interval: Duration) {
        let partition = self.partition;
        let trigger = self.trigger.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let forced = tokio::select! {
                    _ = ticker.tick() => false,
                    _ = trigger.notified() => true,
                };
                counter!("sync_poll_ticks_total", "partition" => partition.as_str()).increment(1);
                tracing::trace!(target: "sync", %partition, forced, "poll tick");
                // Errors are already logged by the refresher; the loop only keeps going.
                if let Err(e) = refresher.refresh(partition).await {
                    tracing::debug!(target: "sync", %partition, error = %e, "poll tick failed");
                }
            }
        });

        let mut slot = self.task.lock().expect("poller mutex poisoned");
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        tracing::info!(
            target: "sync",
            partition = %self.partition,
            interval_secs = interval.as_secs(),
            "poller started"
        );
    }

    /// Out-of-band refresh that leaves the timer phase alone. Returns false
    /// when the poller is not running.
    pub fn force_refresh(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.trigger.notify_one();
        true
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("poller mutex poisoned")
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().expect("poller mutex poisoned").take() {
            handle.abort();
            tracing::info!(target: "sync", partition = %self.partition, "poller stopped");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Both partition pollers. Shared by the components that must force a
/// re-sync after a mutation.
pub struct PollerSet {
    pollers: ByPartition<Poller>,
}

impl Default for PollerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PollerSet {
    pub fn new() -> Self {
        Self {
            pollers: ByPartition::from_fn(Poller::new),
        }
    }

    pub fn get(&self, partition: Partition) -> &Poller {
        self.pollers.get(partition)
    }

    pub fn start_all(&self, refresher: Arc<dyn PartitionRefresher>, interval: Duration) {
        for (_, poller) in self.pollers.iter() {
            poller.start(refresher.clone(), interval);
        }
    }

    pub fn force_refresh(&self, partition: Partition) -> bool {
        self.pollers.get(partition).force_refresh()
    }

    pub fn force_refresh_all(&self) {
        for (partition, poller) in self.pollers.iter() {
            if !poller.force_refresh() {
                tracing::debug!(
                    target: "sync",
                    %partition,
                    "forced refresh skipped; poller not running"
                );
            }
        }
    }

    pub fn stop_all(&self) {
        for (_, poller) in self.pollers.iter() {
            poller.stop();
        }
    }
}
