// src/backend/mock.rs
//! In-memory backend with scripted responses. Used by the test suite; it
//! behaves like the sorter API closely enough that the engine cannot tell
//! the difference.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::Backend;
use crate::error::BackendError;
use crate::model::{
    ByPartition, ConsultationId, ConsultationRecord, FeedbackEvent, Keyword, Partition, Principal,
};

/// Every request the mock has seen, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Fetch(Partition),
    ListKeywords,
    AddKeyword(String),
    DeleteKeyword(i64),
    Feedback(ConsultationId, u8),
    Refilter,
    WhoAmI,
}

/// One queued answer for a partition fetch.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub delay: Duration,
    pub result: Result<Vec<ConsultationRecord>, String>,
}

impl Scripted {
    pub fn ok(records: Vec<ConsultationRecord>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(records),
        }
    }

    pub fn err(msg: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(msg.to_string()),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct MockBackend {
    data: Mutex<ByPartition<Vec<ConsultationRecord>>>,
    scripts: Mutex<ByPartition<VecDeque<Scripted>>>,
    keywords: Mutex<Vec<Keyword>>,
    next_keyword_id: AtomicI64,
    calls: Mutex<Vec<MockCall>>,
    principal: Option<Principal>,
    fetch_delay: Mutex<Duration>,
    fail_feedback: AtomicBool,
    fail_refilter: AtomicBool,
    fail_keywords: AtomicBool,
    /// When false, feedback is accepted but the record is not moved.
    move_on_feedback: AtomicBool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(ByPartition::default()),
            scripts: Mutex::new(ByPartition::default()),
            keywords: Mutex::new(Vec::new()),
            next_keyword_id: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
            principal: None,
            fetch_delay: Mutex::new(Duration::ZERO),
            fail_feedback: AtomicBool::new(false),
            fail_refilter: AtomicBool::new(false),
            fail_keywords: AtomicBool::new(false),
            move_on_feedback: AtomicBool::new(true),
        }
    }

    /// Requests carry credentials and `/api/user/` answers with `principal`.
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn set_partition(&self, partition: Partition, records: Vec<ConsultationRecord>) {
        *self.data.lock().expect("mock mutex poisoned").get_mut(partition) = records;
    }

    pub fn partition(&self, partition: Partition) -> Vec<ConsultationRecord> {
        self.data
            .lock()
            .expect("mock mutex poisoned")
            .get(partition)
            .clone()
    }

    /// Queue a one-off answer; once the queue drains, fetches serve the
    /// current partition data again.
    pub fn push_script(&self, partition: Partition, scripted: Scripted) {
        self.scripts
            .lock()
            .expect("mock mutex poisoned")
            .get_mut(partition)
            .push_back(scripted);
    }

    /// Latency applied to every unscripted fetch.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().expect("mock mutex poisoned") = delay;
    }

    pub fn set_keywords(&self, keywords: Vec<Keyword>) {
        let max = keywords.iter().map(|k| k.id).max().unwrap_or(0);
        self.next_keyword_id.store(max + 1, Ordering::SeqCst);
        *self.keywords.lock().expect("mock mutex poisoned") = keywords;
    }

    pub fn fail_feedback(&self, fail: bool) {
        self.fail_feedback.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refilter(&self, fail: bool) {
        self.fail_refilter.store(fail, Ordering::SeqCst);
    }

    pub fn fail_keywords(&self, fail: bool) {
        self.fail_keywords.store(fail, Ordering::SeqCst);
    }

    pub fn move_on_feedback(&self, enabled: bool) {
        self.move_on_feedback.store(enabled, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().expect("mock mutex poisoned").clone()
    }

    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls
            .lock()
            .expect("mock mutex poisoned")
            .iter()
            .filter(|c| pred(c))
            .count()
    }

    pub fn fetch_count(&self, partition: Partition) -> usize {
        self.count(|c| *c == MockCall::Fetch(partition))
    }

    /// Requests other than partition reads and the principal lookup.
    pub fn mutation_count(&self) -> usize {
        self.count(|c| {
            !matches!(
                c,
                MockCall::Fetch(_) | MockCall::ListKeywords | MockCall::WhoAmI
            )
        })
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().expect("mock mutex poisoned").push(call);
    }

    fn apply_move(&self, event: &FeedbackEvent) {
        let mut data = self.data.lock().expect("mock mutex poisoned");
        let dest = event.decision.intended_partition();
        let mut moved = None;
        for p in Partition::ALL {
            let rows = data.get_mut(p);
            if let Some(pos) = rows
                .iter()
                .position(|r| r.consultation_id == event.consultation_id)
            {
                moved = Some(rows.remove(pos));
            }
        }
        if let Some(rec) = moved {
            data.get_mut(dest).push(rec);
        }
    }
}

fn unavailable(what: &str) -> BackendError {
    BackendError::Unavailable(format!("mock {what} failure"))
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn fetch_partition(
        &self,
        partition: Partition,
    ) -> Result<Vec<ConsultationRecord>, BackendError> {
        self.record(MockCall::Fetch(partition));
        let scripted = self
            .scripts
            .lock()
            .expect("mock mutex poisoned")
            .get_mut(partition)
            .pop_front();
        match scripted {
            Some(s) => {
                if !s.delay.is_zero() {
                    tokio::time::sleep(s.delay).await;
                }
                s.result.map_err(BackendError::Unavailable)
            }
            None => {
                let delay = *self.fetch_delay.lock().expect("mock mutex poisoned");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(self.partition(partition))
            }
        }
    }

    async fn list_keywords(&self) -> Result<Vec<Keyword>, BackendError> {
        self.record(MockCall::ListKeywords);
        if self.fail_keywords.load(Ordering::SeqCst) {
            return Err(unavailable("keywords"));
        }
        Ok(self.keywords.lock().expect("mock mutex poisoned").clone())
    }

    async fn add_keyword(&self, text: &str) -> Result<(), BackendError> {
        self.record(MockCall::AddKeyword(text.to_string()));
        if self.fail_keywords.load(Ordering::SeqCst) {
            return Err(unavailable("keywords"));
        }
        let id = self.next_keyword_id.fetch_add(1, Ordering::SeqCst);
        self.keywords
            .lock()
            .expect("mock mutex poisoned")
            .push(Keyword {
                id,
                text: text.to_string(),
            });
        Ok(())
    }

    async fn delete_keyword(&self, id: i64) -> Result<(), BackendError> {
        self.record(MockCall::DeleteKeyword(id));
        if self.fail_keywords.load(Ordering::SeqCst) {
            return Err(unavailable("keywords"));
        }
        self.keywords
            .lock()
            .expect("mock mutex poisoned")
            .retain(|k| k.id != id);
        Ok(())
    }

    async fn submit_feedback(&self, event: &FeedbackEvent) -> Result<(), BackendError> {
        self.record(MockCall::Feedback(
            event.consultation_id.clone(),
            event.decision.selection(),
        ));
        if self.fail_feedback.load(Ordering::SeqCst) {
            return Err(BackendError::Server {
                status: 500,
                body: "feedback rejected".into(),
            });
        }
        if self.move_on_feedback.load(Ordering::SeqCst) {
            self.apply_move(event);
        }
        Ok(())
    }

    async fn refilter(&self) -> Result<(), BackendError> {
        self.record(MockCall::Refilter);
        if self.fail_refilter.load(Ordering::SeqCst) {
            return Err(unavailable("refilter"));
        }
        Ok(())
    }

    async fn current_principal(&self) -> Result<Principal, BackendError> {
        self.record(MockCall::WhoAmI);
        self.principal.clone().ok_or(BackendError::Server {
            status: 401,
            body: "no credentials".into(),
        })
    }

    fn has_credentials(&self) -> bool {
        self.principal.is_some()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Test/demo helper: a record with predictable attribute values.
pub fn record(id: impl Into<ConsultationId>) -> ConsultationRecord {
    let consultation_id = id.into();
    ConsultationRecord {
        client: format!("client-{consultation_id}"),
        title: format!("consultation {consultation_id}"),
        link: format!("https://marches.example/{consultation_id}"),
        source: "mock".into(),
        publication_date: Some("2025-01-15".into()),
        expiration_date: None,
        consultation_id,
    }
}

pub fn records(ids: &[u64]) -> Vec<ConsultationRecord> {
    ids.iter().map(|&id| record(id)).collect()
}
