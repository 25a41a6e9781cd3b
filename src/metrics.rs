use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

/// Descriptions go to whichever recorder is installed at call time.
fn describe_all() {
    describe_counter!("sync_poll_ticks_total", "Poller wake-ups (timer or forced).");
    describe_counter!("sync_fetch_total", "Partition fetches issued.");
    describe_counter!(
        "sync_fetch_errors_total",
        "Partition fetches that failed; last snapshot kept."
    );
    describe_counter!(
        "sync_stale_responses_total",
        "Responses discarded because a newer snapshot was already applied."
    );
    describe_counter!(
        "sync_new_records_total",
        "Records flagged as new by the diff tracker."
    );
    describe_gauge!(
        "sync_snapshot_records",
        "Records in the last applied snapshot."
    );
    describe_counter!("feedback_sent_total", "Feedback decisions accepted by the server.");
    describe_counter!(
        "feedback_reverted_total",
        "Optimistic removals contradicted by the next poll."
    );
    describe_counter!("keyword_mutations_total", "Keyword adds and removals.");
    describe_counter!("refilter_total", "Refilter passes accepted by the server.");
    describe_counter!("refilter_errors_total", "Refilter requests that failed.");
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        // A session built earlier described into the no-op recorder.
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
