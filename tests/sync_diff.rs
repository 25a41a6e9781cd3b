// tests/sync_diff.rs
//
// Diff & highlight behaviour seen through a session: baseline suppression,
// set difference, TTL expiry, last-write-wins.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use opportunity_sync::backend::mock::{records, MockBackend, Scripted};
use opportunity_sync::{
    ConsultationId, Partition, Principal, RefreshOutcome, Session, SessionConfig, SyncError,
    SyncEvent,
};

const F: Partition = Partition::Filtered;

fn ids(v: &[u64]) -> HashSet<ConsultationId> {
    v.iter().map(|&i| ConsultationId::from(i)).collect()
}

fn session(mock: &Arc<MockBackend>) -> Session {
    Session::new(
        mock.clone(),
        Principal::user("viewer"),
        SessionConfig {
            poll_interval: Duration::from_secs(3600),
            highlight_ttl: Duration::from_secs(300),
            event_capacity: 64,
        },
    )
}

#[tokio::test]
async fn first_fetch_only_sets_the_baseline() {
    let mock = Arc::new(MockBackend::new());
    mock.set_partition(F, records(&[1, 2, 3, 4, 5, 6, 7]));
    let s = session(&mock);

    let out = s.refresh(F).await.unwrap();
    assert_eq!(
        out,
        RefreshOutcome::Applied {
            seq: 1,
            total: 7,
            new: 0
        }
    );
    assert!(s.highlighted(F).is_empty());
    assert!(!s.banner(F));
    assert_eq!(s.visible(F).len(), 7);
}

#[tokio::test]
async fn new_ids_are_current_minus_previous() {
    let mock = Arc::new(MockBackend::new());
    let s = session(&mock);
    let mut events = s.subscribe();

    mock.set_partition(F, records(&[1, 2, 3]));
    s.refresh(F).await.unwrap();
    mock.set_partition(F, records(&[2, 3, 4, 5]));
    s.refresh(F).await.unwrap();

    assert_eq!(s.highlighted(F), ids(&[4, 5]));
    assert!(s.banner(F));

    // baseline event, then the diff
    let first = events.try_recv().unwrap();
    assert!(matches!(first, SyncEvent::SnapshotApplied { ref new_ids, .. } if new_ids.is_empty()));
    assert_eq!(
        events.try_recv().unwrap(),
        SyncEvent::SnapshotApplied {
            partition: F,
            seq: 2,
            total: 4,
            new_ids: vec![ConsultationId::from("4"), ConsultationId::from("5")],
            banner: true,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn highlight_clears_after_ttl_without_further_ticks() {
    let mock = Arc::new(MockBackend::new());
    let s = session(&mock);
    let mut events = s.subscribe();

    mock.set_partition(F, records(&[1]));
    s.refresh(F).await.unwrap();
    mock.set_partition(F, records(&[1, 2]));
    s.refresh(F).await.unwrap();
    assert_eq!(s.highlighted(F), ids(&[2]));

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(s.highlighted(F), ids(&[2]));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(s.highlighted(F).is_empty());
    assert!(!s.banner(F));

    let mut expired = false;
    while let Ok(ev) = events.try_recv() {
        expired |= ev == SyncEvent::HighlightExpired { partition: F };
    }
    assert!(expired, "expiry timer should have announced the clearance");
}

#[tokio::test(start_paused = true)]
async fn later_diff_replaces_highlight_and_timer() {
    let mock = Arc::new(MockBackend::new());
    let s = session(&mock);

    mock.set_partition(F, records(&[1]));
    s.refresh(F).await.unwrap();
    mock.set_partition(F, records(&[1, 2]));
    s.refresh(F).await.unwrap();

    tokio::time::sleep(Duration::from_secs(200)).await;
    mock.set_partition(F, records(&[1, 2, 3]));
    s.refresh(F).await.unwrap();
    assert_eq!(s.highlighted(F), ids(&[3]));

    // the first timer would have fired at 300s
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(s.highlighted(F), ids(&[3]));

    tokio::time::sleep(Duration::from_secs(151)).await;
    assert!(s.highlighted(F).is_empty());
}

#[tokio::test]
async fn failed_fetch_keeps_the_last_snapshot() {
    let mock = Arc::new(MockBackend::new());
    let s = session(&mock);

    mock.set_partition(F, records(&[10, 11]));
    s.refresh(F).await.unwrap();

    mock.push_script(F, Scripted::err("503 from upstream"));
    let err = s.refresh(F).await.unwrap_err();
    assert!(matches!(err, SyncError::FetchFailed { .. }), "got {err:?}");
    assert_eq!(s.visible(F).len(), 2);

    // partitions are independent
    assert!(s.visible(Partition::Rejected).is_empty());
}
