//! Tests for line cancellation and token propagation

use assembly_line::prelude::*;
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn eventually<K, F>(line: &Line<K>, predicate: F) -> Report<K>
where
    K: Category,
    F: Fn(&Report<K>) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let report = line.report().expect("Failed to take report");
        if predicate(&report) {
            return report;
        }
        assert!(Instant::now() < deadline, "condition not reached");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_cancel_abandons_queued_tasks() {
    init_logger();
    let line: Line<u8> = Line::new().expect("Failed to create line");
    line.new_group(0, 0).unwrap();
    line.start(&CancellationToken::new())
        .expect("Failed to start line");

    let executed = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let executed = Arc::clone(&executed);
        line.push(EffectTask::new(0u8, move |_: &CancellationToken| {
            executed.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    line.cancel().expect("Failed to cancel line");

    assert!(line.is_terminated());
    assert_eq!(executed.load(Ordering::SeqCst), 0);
    assert!(matches!(line.report(), Err(LineError::Closed { .. })));
}

#[test]
fn test_cancel_fails_pending_waiters() {
    init_logger();
    let line: Line<u8> = Line::new().unwrap();
    line.new_group(0, 0).unwrap();
    line.start(&CancellationToken::new()).unwrap();
    line.push(EffectTask::new(0u8, |_: &CancellationToken| {}))
        .unwrap();

    let waiter = {
        let line = line.clone();
        thread::spawn(move || line.wait())
    };
    eventually(&line, |r| r.waiters == 1);

    line.cancel().unwrap();
    let result = waiter.join().expect("waiter thread panicked");
    assert!(matches!(result, Err(LineError::Closed { .. })));
}

#[test]
fn test_running_task_observes_cancellation() {
    init_logger();
    let line: Line<u8> = Line::new().unwrap();
    line.new_group(1, 1).unwrap();
    line.start(&CancellationToken::new()).unwrap();

    let (started_tx, started_rx) = bounded(1);
    let (observed_tx, observed_rx) = bounded(1);
    line.push(EffectTask::new(1u8, move |token: &CancellationToken| {
        let _ = started_tx.send(());
        let cancelled = token.wait_timeout(Duration::from_secs(10));
        let _ = observed_tx.send((cancelled, token.check().is_err()));
    }))
    .unwrap();

    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("task never started");
    let start = Instant::now();
    line.cancel().unwrap();

    let (cancelled, check_failed) = observed_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("task never observed cancellation");
    assert!(cancelled);
    assert!(check_failed);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_parent_token_cancels_line() {
    init_logger();
    let parent = CancellationToken::new();
    let line: Line<u8> = Line::new().unwrap();
    line.new_group(0, 0).unwrap();
    line.start(&parent).unwrap();
    line.push(EffectTask::new(0u8, |_: &CancellationToken| {}))
        .unwrap();

    parent.cancel();

    let token = line.token().expect("started line has a token");
    assert!(token.wait_timeout(Duration::from_secs(5)));
    assert_eq!(token.reason(), Some(CancellationReason::ParentCancelled));

    // Stopping again is a no-op, even though work was still queued.
    line.finish().unwrap();
    assert!(line.is_terminated());
    assert_eq!(parent.reason(), Some(CancellationReason::Manual));
}

#[test]
fn test_finish_cancels_line_token_not_parent() {
    init_logger();
    let parent = CancellationToken::new();
    let line: Line<u8> = Line::new().unwrap();
    line.start(&parent).unwrap();
    let token = line.token().unwrap();

    line.finish().unwrap();

    assert!(token.is_cancelled());
    assert_eq!(token.reason(), Some(CancellationReason::LineTerminated));
    assert!(!parent.is_cancelled());
}

#[test]
fn test_cancel_wins_race_with_finish() {
    init_logger();
    let gate = CancellationToken::new();
    let line: Line<u8> = Line::new().unwrap();
    line.new_group(0, 1).unwrap();
    line.start(&CancellationToken::new()).unwrap();

    let gate_clone = gate.clone();
    line.push(EffectTask::new(0u8, move |_: &CancellationToken| {
        gate_clone.wait_timeout(Duration::from_secs(10));
    }))
    .unwrap();
    let queued_ran = Arc::new(AtomicBool::new(false));
    let queued_ran_clone = Arc::clone(&queued_ran);
    line.push(EffectTask::new(0u8, move |_: &CancellationToken| {
        queued_ran_clone.store(true, Ordering::SeqCst);
    }))
    .unwrap();

    let finisher = {
        let line = line.clone();
        thread::spawn(move || line.finish())
    };
    eventually(&line, |r| r.drain_requested);

    line.cancel().unwrap();
    finisher
        .join()
        .expect("finisher panicked")
        .expect("finish should succeed");

    gate.cancel();
    assert!(line.is_terminated());
    assert!(!queued_ran.load(Ordering::SeqCst));
}

#[test]
fn test_dropping_last_handle_stops_line() {
    init_logger();
    let line: Line<u8> = Line::new().unwrap();
    line.new_group(0, 0).unwrap();
    line.start(&CancellationToken::new()).unwrap();
    line.push(EffectTask::new(0u8, |_: &CancellationToken| {}))
        .unwrap();
    let token = line.token().unwrap();

    drop(line);

    assert!(token.is_cancelled());
}

#[test]
fn test_task_holding_line_handle() {
    init_logger();
    let line: Line<u8> = Line::new().unwrap();
    line.new_group(0, 0).unwrap();
    line.start(&CancellationToken::new()).unwrap();

    // The queued task keeps a handle alive, so the line outlives `line`.
    let inner = line.clone();
    line.push(EffectTask::new(0u8, move |_: &CancellationToken| {
        let _ = inner.id();
    }))
    .unwrap();

    let token = line.token().unwrap();
    line.cancel().unwrap();
    drop(line);
    assert!(token.is_cancelled());
}

#[test]
fn test_timeout_token_as_deadline() {
    init_logger();
    let line: Line<u8> = Line::new().unwrap();
    line.new_group(0, 0).unwrap();
    let deadline = CancellationToken::with_timeout(Duration::from_millis(200));
    line.start(&deadline).unwrap();
    line.push(EffectTask::new(0u8, |_: &CancellationToken| {}))
        .unwrap();

    // Never quiescent: the deadline ends the wait.
    let result = line.wait();
    assert!(matches!(result, Err(LineError::Closed { .. })));
    assert!(matches!(
        deadline.reason(),
        Some(CancellationReason::Timeout(_))
    ));
}
