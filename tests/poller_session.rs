// tests/poller_session.rs
//
// Poller lifecycle through a session, on paused time: immediate first
// fetch, fixed interval, survival of failed ticks, cancellation, and
// coalescing of forced refreshes.

use std::sync::Arc;
use std::time::Duration;

use opportunity_sync::backend::mock::{records, MockBackend, Scripted};
use opportunity_sync::{Partition, Principal, Session, SessionConfig};

const F: Partition = Partition::Filtered;
const R: Partition = Partition::Rejected;

fn session(mock: &Arc<MockBackend>, interval: Duration) -> Session {
    Session::new(
        mock.clone(),
        Principal::anonymous(),
        SessionConfig {
            poll_interval: interval,
            ..SessionConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn fetches_immediately_then_on_interval() {
    let mock = Arc::new(MockBackend::new());
    mock.set_partition(F, records(&[1, 2]));
    let s = session(&mock, Duration::from_secs(60));
    s.start().await;
    assert!(s.is_running());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(mock.fetch_count(F), 1);
    assert_eq!(mock.fetch_count(R), 1);
    assert_eq!(s.visible(F).len(), 2);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(mock.fetch_count(F), 2);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(mock.fetch_count(F), 4);
    assert_eq!(mock.fetch_count(R), 4);
}

#[tokio::test(start_paused = true)]
async fn failed_tick_does_not_stop_polling() {
    let mock = Arc::new(MockBackend::new());
    mock.set_partition(F, records(&[3]));
    mock.push_script(F, Scripted::err("connection reset"));
    let s = session(&mock, Duration::from_secs(30));
    s.start().await;

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(s.visible(F).is_empty());
    assert!(s.is_running());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(s.visible(F).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_timer() {
    let mock = Arc::new(MockBackend::new());
    let s = session(&mock, Duration::from_secs(10));
    s.start().await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    s.stop();
    assert!(!s.is_running());
    assert!(!s.force_refresh(F));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(mock.fetch_count(F), 1);
    assert_eq!(mock.fetch_count(R), 1);
}

#[tokio::test(start_paused = true)]
async fn forced_refreshes_during_a_fetch_collapse_into_one() {
    let mock = Arc::new(MockBackend::new());
    mock.set_fetch_delay(Duration::from_secs(5));
    let s = session(&mock, Duration::from_secs(3600));
    s.start().await;

    // first fetch is still in flight
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(s.force_refresh(F));
    assert!(s.force_refresh(F));
    assert!(s.force_refresh(F));

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(mock.fetch_count(F), 2);
    assert_eq!(mock.fetch_count(R), 1);
    assert_eq!(s.snapshot(F).applied_seq, 2);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_does_nothing_before_start() {
    let mock = Arc::new(MockBackend::new());
    let s = session(&mock, Duration::from_secs(60));
    assert!(!s.force_refresh(F));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(mock.fetch_count(F), 0);
}
