// tests/sync_ordering.rs
use std::sync::Arc;
use std::time::Duration;

use opportunity_sync::backend::mock::{records, MockBackend, Scripted};
use opportunity_sync::{
    ConsultationId, Partition, Principal, RefreshOutcome, Session, SessionConfig,
};

const F: Partition = Partition::Filtered;

fn session(mock: &Arc<MockBackend>) -> Session {
    Session::new(mock.clone(), Principal::anonymous(), SessionConfig::default())
}

fn visible_ids(s: &Session, p: Partition) -> Vec<ConsultationId> {
    s.visible(p).into_iter().map(|r| r.consultation_id).collect()
}

#[tokio::test(start_paused = true)]
async fn slow_earlier_fetch_never_overwrites_later_one() {
    let mock = Arc::new(MockBackend::new());
    mock.push_script(
        F,
        Scripted::ok(records(&[1])).after(Duration::from_millis(100)),
    );
    mock.push_script(
        F,
        Scripted::ok(records(&[1, 2])).after(Duration::from_millis(10)),
    );
    let s = session(&mock);

    let (first, second) = tokio::join!(s.refresh(F), async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        s.refresh(F).await
    });

    assert_eq!(
        second.unwrap(),
        RefreshOutcome::Applied {
            seq: 2,
            total: 2,
            new: 0
        }
    );
    assert_eq!(first.unwrap(), RefreshOutcome::Stale { seq: 1 });
    assert_eq!(
        visible_ids(&s, F),
        vec![ConsultationId::from("1"), ConsultationId::from("2")]
    );
    assert_eq!(s.snapshot(F).applied_seq, 2);
}

#[tokio::test(start_paused = true)]
async fn in_order_responses_are_both_applied() {
    let mock = Arc::new(MockBackend::new());
    mock.push_script(
        F,
        Scripted::ok(records(&[1])).after(Duration::from_millis(5)),
    );
    mock.push_script(
        F,
        Scripted::ok(records(&[1, 2])).after(Duration::from_millis(50)),
    );
    let s = session(&mock);

    let (first, second) = tokio::join!(s.refresh(F), async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        s.refresh(F).await
    });

    assert!(matches!(first.unwrap(), RefreshOutcome::Applied { seq: 1, .. }));
    assert_eq!(
        second.unwrap(),
        RefreshOutcome::Applied {
            seq: 2,
            total: 2,
            new: 1
        }
    );
    assert_eq!(s.highlighted(F).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn responses_arriving_after_teardown_are_ignored() {
    let mock = Arc::new(MockBackend::new());
    mock.push_script(
        F,
        Scripted::ok(records(&[7, 8])).after(Duration::from_millis(50)),
    );
    let s = session(&mock);

    let (out, _) = tokio::join!(s.refresh(F), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        s.stop();
    });

    assert_eq!(out.unwrap(), RefreshOutcome::Ignored);
    assert!(s.visible(F).is_empty());

    // and nothing new is issued once closed
    assert_eq!(s.refresh(F).await.unwrap(), RefreshOutcome::Ignored);
    assert_eq!(mock.fetch_count(F), 1);
}
