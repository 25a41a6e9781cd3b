// src/feedback.rs
//! Feedback Submitter: send one classification decision, then optimistically
//! hide the record from the partition that showed it. The cross-partition
//! insert is the server's job; the next poll shows where the record landed.

use std::sync::Arc;

use metrics::counter;

use crate::auth::{self, Action};
use crate::backend::Backend;
use crate::error::{Result, SyncError};
use crate::model::{
    ConsultationId, ConsultationRecord, Decision, FeedbackEvent, Partition, Principal,
};
use crate::poller::PollerSet;
use crate::sync::SyncState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// Accepted by the server; hidden locally from `from`.
    Sent { from: Partition },
    /// The record is not displayed (already removed, or a submission is in
    /// flight). Nothing was sent.
    AlreadyRemoved,
}

pub struct FeedbackSubmitter {
    backend: Arc<dyn Backend>,
    state: Arc<SyncState>,
    pollers: Arc<PollerSet>,
    principal: Principal,
}

impl FeedbackSubmitter {
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
        }
    }

    pub async fn submit(
        &self,
        record: &ConsultationRecord,
        decision: Decision,
    ) -> Result<FeedbackOutcome> {
        auth::require(&self.principal, Action::SubmitFeedback)?;
        if self.state.is_closed() {
            return Err(SyncError::SessionClosed);
        }

        let id = &record.consultation_id;
        let Some((from, _)) = self.state.begin_submit(id) else {
            tracing::debug!(target: "feedback", %id, "record not displayed; nothing to send");
            return Ok(FeedbackOutcome::AlreadyRemoved);
        };

        let event = FeedbackEvent::for_record(record, decision);
        self.send(from, event).await
    }

    /// Same as `submit`, looking the record up in the current snapshots.
    pub async fn submit_id(
        &self,
        id: &ConsultationId,
        decision: Decision,
    ) -> Result<FeedbackOutcome> {
        auth::require(&self.principal, Action::SubmitFeedback)?;
        if self.state.is_closed() {
            return Err(SyncError::SessionClosed);
        }

        let Some((from, record)) = self.state.begin_submit(id) else {
            tracing::debug!(target: "feedback", %id, "record not displayed; nothing to send");
            return Ok(FeedbackOutcome::AlreadyRemoved);
        };

        let event = FeedbackEvent::for_record(&record, decision);
        self.send(from, event).await
    }

    async fn send(&self, from: Partition, event: FeedbackEvent) -> Result<FeedbackOutcome> {
        let id = event.consultation_id.clone();
        let decision = event.decision;

        match self.backend.submit_feedback(&event).await {
            Ok(()) => {
                self.state.confirm_removal(from, &id, decision);
                counter!("feedback_sent_total", "decision" => decision.to_string()).increment(1);
                tracing::info!(
                    target: "feedback",
                    %id,
                    %decision,
                    %from,
                    "feedback accepted; record hidden pending next poll"
                );
                self.pollers.force_refresh_all();
                Ok(FeedbackOutcome::Sent { from })
            }
            Err(source) => {
                self.state.abort_submit(from, &id);
                tracing::warn!(
                    target: "feedback",
                    %id,
                    %decision,
                    error = %source,
                    "feedback failed"
                );
                Err(SyncError::FeedbackFailed { id, source })
            }
        }
    }
}
