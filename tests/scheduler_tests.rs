//! Integration tests covering the literal end-to-end scenarios this crate
//! generalizes from `examples/original_source/scheduler_test.go`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deadline_scheduler::{CancelToken, Deadline, Scheduler};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn send_task(id: i32, tx: mpsc::UnboundedSender<i32>) -> deadline_scheduler::Callback {
    Box::new(move |_fired_at| {
        let _ = tx.send(id);
    })
}

/// Installs a test-scoped `tracing` subscriber so `cargo test -- --nocapture`
/// shows the scheduler's internal state-transition events. Safe to call from
/// every test; only the first call in a process wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Reproduces the original ordered-drain-with-reorder scenario: a batch of
/// jobs submitted up front, one of them pre-cancelled, and one whose
/// callback submits two more jobs while the scheduler is already running.
/// The expected firing order interleaves the late submissions among the
/// still-pending ones purely by deadline.
#[tokio::test]
async fn ordered_drain_with_reorder() {
    init_tracing();
    let scheduler = Scheduler::new(1);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let base = Deadline::after(Duration::from_millis(60));
    let times: Vec<Deadline> = (0..8)
        .map(|i| base + Duration::from_millis(i * 15))
        .collect();

    scheduler.set(None, times[0], Some(send_task(0, tx.clone()))).await.unwrap();
    scheduler.set(None, times[3], Some(send_task(1, tx.clone()))).await.unwrap();
    scheduler.set(None, times[2], Some(send_task(2, tx.clone()))).await.unwrap();
    scheduler.set(None, times[5], Some(send_task(3, tx.clone()))).await.unwrap();
    scheduler.set(None, times[1], Some(send_task(4, tx.clone()))).await.unwrap();
    scheduler.set(None, times[1], Some(send_task(4, tx.clone()))).await.unwrap();

    let already_cancelled = CancelToken::new();
    already_cancelled.cancel();
    let err = scheduler
        .set(Some(already_cancelled), times[4], Some(send_task(5, tx.clone())))
        .await
        .unwrap_err();
    assert_eq!(err, deadline_scheduler::SetError::TaskCancelled);

    let scheduler_for_callback = scheduler.clone();
    let tx_for_callback = tx.clone();
    let times6 = times[6];
    let times7 = times[7];
    let reentrant_submit: deadline_scheduler::Callback = Box::new(move |_fired_at| {
        let scheduler = scheduler_for_callback.clone();
        let tx = tx_for_callback.clone();
        tokio::spawn(async move {
            let _ = scheduler.set(None, times7, Some(send_task(7, tx.clone()))).await;
            let _ = scheduler.set(None, times6, Some(send_task(6, tx))).await;
        });
    });
    scheduler.set(None, times[2], Some(reentrant_submit)).await.unwrap();

    // Nothing should fire before the earliest deadline.
    assert!(timeout(Duration::from_millis(20), rx.recv()).await.is_err());

    let expected = [0, 4, 4, 2, 1, 3, 6, 7];
    for want in expected {
        let got = timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("job did not fire in time")
            .expect("channel closed early");
        assert_eq!(got, want);
    }

    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn zero_worker_mode_drains_inline() {
    let scheduler = Scheduler::new(0);
    let fired = Arc::new(AtomicUsize::new(0));
    let deadline = Deadline::after(Duration::from_millis(20));

    for _ in 0..1000 {
        let fired = fired.clone();
        let callback: deadline_scheduler::Callback = Box::new(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.set(None, deadline, Some(callback)).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1000);
    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn change_workers_shrink_still_drains_all() {
    let scheduler = Scheduler::new(4);
    let fired = Arc::new(AtomicUsize::new(0));
    let deadline = Deadline::after(Duration::from_millis(10));

    for _ in 0..1000 {
        let fired = fired.clone();
        let callback: deadline_scheduler::Callback = Box::new(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.set(None, deadline, Some(callback)).await.unwrap();
    }

    scheduler.change_workers(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1000);
    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn close_is_not_idempotent() {
    let scheduler = Scheduler::new(2);
    scheduler.close().await.unwrap();
    let err = scheduler.close().await.unwrap_err();
    assert_eq!(err, deadline_scheduler::CloseError::AlreadyClosed);
}

#[tokio::test]
async fn rejects_zero_deadline() {
    let scheduler = Scheduler::new(1);
    let err = scheduler
        .set(None, Deadline::ZERO, Some(Box::new(|_| {})))
        .await
        .unwrap_err();
    assert_eq!(err, deadline_scheduler::SetError::InvalidTime);
    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn rejects_absent_callback() {
    let scheduler = Scheduler::new(1);
    let err = scheduler
        .set(None, Deadline::after(Duration::from_millis(10)), None)
        .await
        .unwrap_err();
    assert_eq!(err, deadline_scheduler::SetError::InvalidTask);
    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn rejects_submissions_after_close() {
    let scheduler = Scheduler::new(1);
    scheduler.close().await.unwrap();
    let err = scheduler
        .set(None, Deadline::after(Duration::from_millis(10)), Some(Box::new(|_| {})))
        .await
        .unwrap_err();
    assert_eq!(err, deadline_scheduler::SetError::Closed);
}

#[tokio::test]
async fn rejects_negative_worker_count() {
    let scheduler = Scheduler::new(1);
    let err = scheduler.change_workers(-1).await.unwrap_err();
    assert_eq!(err, deadline_scheduler::ResizeError::InvalidWorkers);
    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn cancel_before_fire_prevents_invocation() {
    let scheduler = Scheduler::new(1);
    let fired = Arc::new(AtomicUsize::new(0));
    let cancel = CancelToken::new();
    let deadline = Deadline::after(Duration::from_millis(60));

    let fired_clone = fired.clone();
    let callback: deadline_scheduler::Callback = Box::new(move |_| {
        fired_clone.fetch_add(1, Ordering::SeqCst);
    });
    scheduler.set(Some(cancel.clone()), deadline, Some(callback)).await.unwrap();
    cancel.cancel();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn panicking_callback_does_not_take_down_the_scheduler() {
    init_tracing();
    let scheduler = Scheduler::new(1);
    let (tx, mut rx) = mpsc::unbounded_channel();

    scheduler
        .set(
            None,
            Deadline::after(Duration::from_millis(10)),
            Some(Box::new(|_| panic!("boom"))),
        )
        .await
        .unwrap();
    scheduler
        .set(None, Deadline::after(Duration::from_millis(30)), Some(send_task(1, tx)))
        .await
        .unwrap();

    let got = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("scheduler stopped making progress after a panicking callback")
        .unwrap();
    assert_eq!(got, 1);
    scheduler.close().await.unwrap();
}
