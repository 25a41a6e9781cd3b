// src/store.rs
//! Record Store: last known contents of one partition.
//!
//! Snapshots are replaced wholesale. Each fetch is tagged with a sequence
//! number when it is issued; a response is applied only if it is newer than
//! the last applied one, so a slow early fetch can never overwrite a fresher
//! snapshot.
//!
//! Per-record optimistic state (records not listed are DISPLAYED):
//!
//! ```text
//! DISPLAYED -> SUBMITTING -> PENDING_REMOVAL -> RECONCILED | REVERTED
//!                  \-> DISPLAYED (feedback failed)
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::model::{ConsultationId, ConsultationRecord, Decision, Partition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Feedback request in flight; still shown, but cannot be resubmitted.
    Submitting,
    /// Feedback accepted; hidden until a fetch issued at or after
    /// `watermark` confirms or contradicts the move.
    PendingRemoval { decision: Decision, watermark: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The record left this partition as expected.
    Reconciled(ConsultationId),
    /// The server kept the record here; it is displayed again.
    Reverted(ConsultationId),
}

/// Result of applying a fresh snapshot.
#[derive(Debug, Clone)]
pub struct Applied {
    pub seq: u64,
    /// `None` on the first snapshot ever applied (baseline).
    pub previous_ids: Option<HashSet<ConsultationId>>,
    pub current_ids: HashSet<ConsultationId>,
    pub reconciliations: Vec<Reconciliation>,
}

#[derive(Debug)]
pub struct RecordStore {
    partition: Partition,
    records: Vec<ConsultationRecord>,
    ids: Option<HashSet<ConsultationId>>,
    next_seq: u64,
    applied_seq: u64,
    fetched_at: Option<DateTime<Utc>>,
    states: HashMap<ConsultationId, RecordState>,
}

impl RecordStore {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            records: Vec::new(),
            ids: None,
            next_seq: 1,
            applied_seq: 0,
            fetched_at: None,
            states: HashMap::new(),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Tag a fetch that is about to be issued.
    pub fn begin_fetch(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    pub fn has_baseline(&self) -> bool {
        self.ids.is_some()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Replace the snapshot with the response of fetch `seq`.
    /// Returns `None` (and changes nothing) when the response is stale.
    pub fn apply(
        &mut self,
        seq: u64,
        records: Vec<ConsultationRecord>,
        now: DateTime<Utc>,
    ) -> Option<Applied> {
        if seq <= self.applied_seq {
            return None;
        }

        let current_ids: HashSet<ConsultationId> =
            records.iter().map(|r| r.consultation_id.clone()).collect();

        let mut reconciliations = Vec::new();
        self.states.retain(|id, state| match *state {
            RecordState::PendingRemoval { watermark, .. } if seq >= watermark => {
                if current_ids.contains(id) {
                    reconciliations.push(Reconciliation::Reverted(id.clone()));
                } else {
                    reconciliations.push(Reconciliation::Reconciled(id.clone()));
                }
                false
            }
            _ => true,
        });

        let previous_ids = self.ids.replace(current_ids.clone());
        self.records = records;
        self.applied_seq = seq;
        self.fetched_at = Some(now);

        Some(Applied {
            seq,
            previous_ids,
            current_ids,
            reconciliations,
        })
    }

    /// Records as the view should show them: server order, minus records
    /// optimistically removed.
    pub fn visible(&self) -> Vec<ConsultationRecord> {
        self.records
            .iter()
            .filter(|r| !self.is_hidden(&r.consultation_id))
            .cloned()
            .collect()
    }

    pub fn visible_len(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !self.is_hidden(&r.consultation_id))
            .count()
    }

    /// Raw server snapshot, including optimistically removed records.
    pub fn snapshot(&self) -> &[ConsultationRecord] {
        &self.records
    }

    pub fn find_visible(&self, id: &ConsultationId) -> Option<&ConsultationRecord> {
        if self.is_hidden(id) {
            return None;
        }
        self.records.iter().find(|r| &r.consultation_id == id)
    }

    pub fn state(&self, id: &ConsultationId) -> Option<RecordState> {
        self.states.get(id).copied()
    }

    fn is_hidden(&self, id: &ConsultationId) -> bool {
        matches!(self.states.get(id), Some(RecordState::PendingRemoval { .. }))
    }

    /// DISPLAYED -> SUBMITTING. Returns the record to send, or `None` if it
    /// is not displayed here or a submission is already under way.
    pub fn begin_submit(&mut self, id: &ConsultationId) -> Option<ConsultationRecord> {
        if self.states.contains_key(id) {
            return None;
        }
        let record = self.records.iter().find(|r| &r.consultation_id == id)?.clone();
        self.states.insert(id.clone(), RecordState::Submitting);
        Some(record)
    }

    /// SUBMITTING -> PENDING_REMOVAL. Only fetches issued from now on may
    /// reconcile the record.
    pub fn confirm_removal(&mut self, id: &ConsultationId, decision: Decision) {
        let watermark = self.next_seq;
        self.states.insert(
            id.clone(),
            RecordState::PendingRemoval {
                decision,
                watermark,
            },
        );
    }

    /// SUBMITTING -> DISPLAYED.
    pub fn abort_submit(&mut self, id: &ConsultationId) {
        if self.states.get(id) == Some(&RecordState::Submitting) {
            self.states.remove(id);
        }
    }

    pub fn pending_removals(&self) -> usize {
        self.states
            .values()
            .filter(|s| matches!(s, RecordState::PendingRemoval { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::records;

    fn ids(v: &[u64]) -> HashSet<ConsultationId> {
        v.iter().map(|&i| ConsultationId::from(i)).collect()
    }

    #[test]
    fn first_apply_has_no_previous_ids() {
        let mut s = RecordStore::new(Partition::Filtered);
        let seq = s.begin_fetch();
        let a = s.apply(seq, records(&[1, 2]), Utc::now()).unwrap();
        assert!(a.previous_ids.is_none());
        assert_eq!(a.current_ids, ids(&[1, 2]));
        assert!(s.has_baseline());

        let seq = s.begin_fetch();
        let a = s.apply(seq, records(&[2, 3]), Utc::now()).unwrap();
        assert_eq!(a.previous_ids, Some(ids(&[1, 2])));
    }

    #[test]
    fn older_response_never_overwrites_newer() {
        let mut s = RecordStore::new(Partition::Filtered);
        let first = s.begin_fetch();
        let second = s.begin_fetch();
        assert!(s.apply(second, records(&[1, 2, 3]), Utc::now()).is_some());
        assert!(s.apply(first, records(&[9]), Utc::now()).is_none());
        assert_eq!(s.visible_len(), 3);
        assert_eq!(s.applied_seq(), second);
    }

    #[test]
    fn pending_removal_hides_then_reconciles() {
        let mut s = RecordStore::new(Partition::Filtered);
        let seq = s.begin_fetch();
        s.apply(seq, records(&[101, 102, 103]), Utc::now());

        let id = ConsultationId::from("103");
        assert!(s.begin_submit(&id).is_some());
        // in flight: still shown, not resubmittable
        assert!(s.find_visible(&id).is_some());
        assert!(s.begin_submit(&id).is_none());

        s.confirm_removal(&id, Decision::Reject);
        assert!(s.find_visible(&id).is_none());
        assert_eq!(s.visible_len(), 2);
        assert!(s.begin_submit(&id).is_none());

        let seq = s.begin_fetch();
        let a = s.apply(seq, records(&[101, 102]), Utc::now()).unwrap();
        assert_eq!(a.reconciliations, vec![Reconciliation::Reconciled(id.clone())]);
        assert_eq!(s.state(&id), None);
    }

    #[test]
    fn server_contradiction_reverts_the_record() {
        let mut s = RecordStore::new(Partition::Filtered);
        let seq = s.begin_fetch();
        s.apply(seq, records(&[1, 2]), Utc::now());

        let id = ConsultationId::from("2");
        s.begin_submit(&id);
        s.confirm_removal(&id, Decision::Reject);

        let seq = s.begin_fetch();
        let a = s.apply(seq, records(&[1, 2]), Utc::now()).unwrap();
        assert_eq!(a.reconciliations, vec![Reconciliation::Reverted(id.clone())]);
        assert!(s.find_visible(&id).is_some());
    }

    #[test]
    fn fetch_issued_before_confirmation_does_not_reconcile() {
        let mut s = RecordStore::new(Partition::Filtered);
        let seq = s.begin_fetch();
        s.apply(seq, records(&[1, 2]), Utc::now());

        let id = ConsultationId::from("2");
        s.begin_submit(&id);
        let in_flight = s.begin_fetch();
        s.confirm_removal(&id, Decision::Reject);

        // Response predates the feedback: record still there, but no revert.
        let a = s.apply(in_flight, records(&[1, 2]), Utc::now()).unwrap();
        assert!(a.reconciliations.is_empty());
        assert!(s.find_visible(&id).is_none());
        assert_eq!(s.pending_removals(), 1);
    }

    #[test]
    fn aborted_submission_restores_display() {
        let mut s = RecordStore::new(Partition::Rejected);
        let seq = s.begin_fetch();
        s.apply(seq, records(&[5]), Utc::now());
        let id = ConsultationId::from("5");
        s.begin_submit(&id);
        s.abort_submit(&id);
        assert_eq!(s.state(&id), None);
        assert!(s.begin_submit(&id).is_some());
    }
}
