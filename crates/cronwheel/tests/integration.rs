//! End-to-end scheduler tests against the real clock.
//!
//! The every-second cadence test runs for several wall-clock seconds; the
//! tolerances leave room for one wheel tick (100 ms) of quantisation plus
//! scheduler jitter on a loaded machine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use cronwheel::{AddError, Dispatch, Scheduler, SchedulerConfig};

fn scheduler(dispatch: Dispatch) -> Scheduler {
    Scheduler::new(SchedulerConfig {
        tick_duration: Duration::from_millis(100),
        wheel_size: 512,
        dispatch,
    })
    .expect("default-shaped config must validate")
}

#[tokio::test(flavor = "multi_thread")]
async fn every_second_cron_fires_on_a_one_second_cadence() {
    let scheduler = scheduler(Dispatch::Spawned);
    let fires: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&fires);
    scheduler
        .add("heartbeat", "* * * * * ?", move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(Instant::now());
            }
        })
        .unwrap();

    // Five firings plus alignment to the first whole second.
    tokio::time::sleep(Duration::from_millis(6500)).await;
    scheduler.shutdown().await;

    let fires = fires.lock();
    assert!(
        fires.len() >= 5,
        "expected at least five firings in 6.5s, saw {}",
        fires.len()
    );
    for pair in fires.windows(2) {
        let spacing = pair[1].duration_since(pair[0]);
        let error = if spacing > Duration::from_secs(1) {
            spacing - Duration::from_secs(1)
        } else {
            Duration::from_secs(1) - spacing
        };
        assert!(
            error <= Duration::from_millis(300),
            "firing cadence drifted: consecutive fires {spacing:?} apart"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_mid_chain_stops_further_firings() {
    let scheduler = scheduler(Dispatch::Spawned);
    let count = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&count);
    scheduler
        .add("tick", "* * * * * ?", move || {
            let count = Arc::clone(&counter);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(scheduler.cancel("tick"));
    let at_cancel = count.load(Ordering::SeqCst);
    assert!(at_cancel >= 1, "expected at least one firing before cancel");

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let after = count.load(Ordering::SeqCst);
    assert!(
        after <= at_cancel + 1,
        "firings must stop after cancel: {at_cancel} then {after}"
    );
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn inline_dispatch_also_fires() {
    let scheduler = scheduler(Dispatch::Inline);
    let count = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&count);
    scheduler
        .add("inline", "* * * * * ?", move || {
            let count = Arc::clone(&counter);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    scheduler.shutdown().await;
    assert!(count.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn shutdown_reports_never_fired_tasks_and_blocks_new_ones() {
    let scheduler = scheduler(Dispatch::Spawned);
    scheduler
        .add("far-future", "0 0 0 1 1 ? 2190", || async {})
        .unwrap();
    scheduler
        .add("also-far", "0 0 0 1 6 ? 2190", || async {})
        .unwrap();

    let mut pending = scheduler.shutdown().await;
    pending.sort();
    assert_eq!(pending, vec!["also-far".to_string(), "far-future".to_string()]);

    let err = scheduler.add("late", "* * * * * ?", || async {}).err().unwrap();
    assert!(matches!(err, AddError::Shutdown));
    assert!(scheduler.cancel("far-future"), "cancel stays idempotent after shutdown");
}

#[tokio::test]
async fn add_surfaces_parse_diagnostics() {
    let scheduler = scheduler(Dispatch::Spawned);
    let err = scheduler
        .add("broken", "not a cron at all", || async {})
        .err()
        .unwrap();
    match err {
        AddError::InvalidCron(parse) => {
            let message = parse.to_string();
            assert!(message.contains("not a cron at all"));
        }
        other => panic!("expected InvalidCron, got {other:?}"),
    }
    scheduler.shutdown().await;
}
