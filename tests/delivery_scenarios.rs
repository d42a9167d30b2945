//! End-to-end delivery scenarios against stub transports.
//!
//! All tests run on a paused clock, so backoff waits complete instantly and
//! elapsed times are exact multiples of the schedule.

mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use common::{config, drain, policy, uuid, DedupServer, StubTransport};
use result_courier::{
    AbandonReason, Courier, DeliveryOutcome, Disposition, EventKind, TaskResult,
};

fn refused() -> DeliveryOutcome {
    DeliveryOutcome::Unavailable("tcp connect error: Connection refused".to_string())
}

fn assert_elapsed_near(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_millis(50);
    assert!(
        actual >= expected && actual <= expected + tolerance,
        "elapsed {actual:?} not within {tolerance:?} of {expected:?}"
    );
}

// ─── Spec scenarios ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn acknowledged_after_one_attempt() {
    let id = uuid(0xA);
    let transport = Arc::new(StubTransport::new(DeliveryOutcome::Acknowledged));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "ok", true)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    let report = summary.report_for(id).unwrap();
    assert_eq!(report.disposition, Disposition::Acknowledged);
    assert_eq!(report.attempts, 1);
    assert_eq!(transport.calls_for(id), 1);
    assert_eq!(summary.acknowledged, 1);
    assert_eq!(summary.abandoned, 0);
}

#[tokio::test(start_paused = true)]
async fn acknowledged_after_three_refusals_with_growing_delays() {
    let id = uuid(0xB);
    let transport = Arc::new(
        StubTransport::new(DeliveryOutcome::Acknowledged)
            .script(id, [refused(), refused(), refused()]),
    );
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "", false)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    let report = summary.report_for(id).unwrap();
    assert_eq!(report.disposition, Disposition::Acknowledged);
    assert_eq!(report.attempts, 4);
    assert_eq!(transport.calls_for(id), 4);

    let delays: Vec<Duration> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::RetryScheduled { delay } => Some(delay),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(500),
            Duration::from_millis(1_000),
            Duration::from_millis(2_000),
        ]
    );

    let times = transport.call_times(id);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps.len(), 3);
    assert!(gaps.windows(2).all(|g| g[1] > g[0]), "gaps must grow: {gaps:?}");
    assert_elapsed_near(report.elapsed, Duration::from_millis(3_500));
}

#[tokio::test(start_paused = true)]
async fn one_megabyte_rejected_is_abandoned_after_one_attempt() {
    let id = uuid(0xC);
    let contents: Vec<u8> = (0..1_048_576u32).map(|i| (i % 251) as u8 ^ 0x80).collect();
    let transport = Arc::new(StubTransport::new(DeliveryOutcome::Rejected(
        "HTTP 400: bad submission".to_string(),
    )));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let run = tokio::spawn(courier.run());

    handle
        .intake(TaskResult::new(id, contents, true))
        .await
        .unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    let report = summary.report_for(id).unwrap();
    assert_eq!(
        report.disposition,
        Disposition::Abandoned(AbandonReason::Rejected("HTTP 400: bad submission".to_string()))
    );
    assert_eq!(report.attempts, 1);
    assert_eq!(transport.total_calls(), 1);
}

// ─── Retry policy ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn retry_budget_bounds_attempts_and_wait_time() {
    let id = uuid(1);
    let transport = Arc::new(StubTransport::new(refused()));
    let (courier, handle) = Courier::with_shared(config(policy(4)), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    let report = summary.report_for(id).unwrap();
    assert_eq!(
        report.disposition,
        Disposition::Abandoned(AbandonReason::RetryBudgetExhausted { last: refused() })
    );
    assert_eq!(report.attempts, 4);
    assert_eq!(transport.calls_for(id), 4);
    // 500 + 1000 + 2000: no wait after the final attempt.
    assert_elapsed_near(report.elapsed, Duration::from_millis(3_500));

    let terminal: Vec<_> = drain(&mut events).into_iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_is_retried_like_unavailable() {
    let id = uuid(2);
    let transport = Arc::new(
        StubTransport::new(DeliveryOutcome::Acknowledged)
            .script(id, [DeliveryOutcome::Unreachable("dns error".to_string())]),
    );
    let (courier, handle) = Courier::with_shared(config(policy(3)), transport.clone()).unwrap();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    assert_eq!(summary.report_for(id).unwrap().attempts, 2);
    assert_eq!(summary.acknowledged, 1);
}

#[tokio::test(start_paused = true)]
async fn rejection_is_never_retried() {
    let id = uuid(3);
    let transport = Arc::new(
        StubTransport::new(DeliveryOutcome::Acknowledged)
            .script(id, [DeliveryOutcome::Rejected("HTTP 422".to_string())]),
    );
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    assert_eq!(transport.calls_for(id), 1);
    assert!(matches!(
        summary.report_for(id).unwrap().disposition,
        Disposition::Abandoned(AbandonReason::Rejected(_))
    ));
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e.kind, EventKind::RetryScheduled { .. })));
}

#[tokio::test(start_paused = true)]
async fn elapsed_bound_stops_retries_early() {
    let id = uuid(4);
    let transport = Arc::new(StubTransport::new(refused()));
    let retry = policy(10).with_max_elapsed(Duration::from_millis(2_000));
    let (courier, handle) = Courier::with_shared(config(retry), transport.clone()).unwrap();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    // Waits of 500 and 1000 fit; the next 2000 would overrun the bound.
    let report = summary.report_for(id).unwrap();
    assert_eq!(report.attempts, 3);
    assert!(matches!(
        report.disposition,
        Disposition::Abandoned(AbandonReason::RetryBudgetExhausted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn hung_attempt_is_timed_out_and_retried() {
    let id = uuid(5);
    let transport = Arc::new(
        StubTransport::new(DeliveryOutcome::Acknowledged).with_latency(Duration::from_secs(3_600)),
    );
    let retry = policy(2).with_attempt_timeout(Duration::from_secs(1));
    let (courier, handle) = Courier::with_shared(config(retry), transport.clone()).unwrap();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    let report = summary.report_for(id).unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(
        report.disposition,
        Disposition::Abandoned(AbandonReason::RetryBudgetExhausted {
            last: DeliveryOutcome::Unavailable("attempt timed out after 1000ms".to_string()),
        })
    );
    // Two 1s attempts around one 500ms wait.
    assert_elapsed_near(report.elapsed, Duration::from_millis(2_500));
}

// ─── Cancellation and shutdown ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancelling_a_retrying_result_skips_further_attempts() {
    let id = uuid(6);
    let transport = Arc::new(StubTransport::new(refused()));
    let retry = policy(5).with_backoff(Duration::from_secs(60), Duration::from_secs(60));
    let (courier, handle) = Courier::with_shared(config(retry), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    loop {
        let event = events.recv().await.unwrap();
        if matches!(event.kind, EventKind::RetryScheduled { .. }) {
            break;
        }
    }
    handle.cancel(id).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    let report = summary.report_for(id).unwrap();
    assert_eq!(report.disposition, Disposition::Abandoned(AbandonReason::Cancelled));
    assert_eq!(report.attempts, 1);
    assert_eq!(transport.calls_for(id), 1);
    assert!(report.elapsed < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn cancelling_in_flight_lets_the_attempt_finish_without_retry() {
    let id = uuid(7);
    let transport = Arc::new(StubTransport::new(refused()).with_latency(Duration::from_millis(200)));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    loop {
        if matches!(events.recv().await.unwrap().kind, EventKind::AttemptStarted) {
            break;
        }
    }
    handle.cancel(id).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    let report = summary.report_for(id).unwrap();
    assert_eq!(report.disposition, Disposition::Abandoned(AbandonReason::Cancelled));
    assert_eq!(report.attempts, 1);
    assert_elapsed_near(report.elapsed, Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn cancelling_in_flight_keeps_an_acknowledgement() {
    let id = uuid(8);
    let transport = Arc::new(
        StubTransport::new(DeliveryOutcome::Acknowledged).with_latency(Duration::from_millis(200)),
    );
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    loop {
        if matches!(events.recv().await.unwrap().kind, EventKind::AttemptStarted) {
            break;
        }
    }
    handle.cancel(id).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    assert_eq!(summary.report_for(id).unwrap().disposition, Disposition::Acknowledged);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_pending_result_never_submits() {
    let id = uuid(9);
    let transport = Arc::new(StubTransport::new(DeliveryOutcome::Acknowledged));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let mut events = handle.subscribe();

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    handle.cancel(id).await.unwrap();
    drop(handle);
    let summary = courier.run().await;

    let report = summary.report_for(id).unwrap();
    assert_eq!(report.disposition, Disposition::Abandoned(AbandonReason::Cancelled));
    assert_eq!(report.attempts, 0);
    assert_eq!(transport.total_calls(), 0);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| e.kind == EventKind::AttemptStarted));
}

#[tokio::test(start_paused = true)]
async fn cancel_only_affects_its_own_result() {
    let kept = uuid(0x0a);
    let cancelled = uuid(0x0b);
    let transport = Arc::new(StubTransport::new(DeliveryOutcome::Acknowledged));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();

    handle.intake(TaskResult::new(kept, "keep", true)).await.unwrap();
    handle.intake(TaskResult::new(cancelled, "drop", true)).await.unwrap();
    handle.cancel(cancelled).await.unwrap();
    drop(handle);
    let summary = courier.run().await;

    assert_eq!(summary.report_for(kept).unwrap().disposition, Disposition::Acknowledged);
    assert_eq!(transport.calls_for(kept), 1);
    assert_eq!(transport.calls_for(cancelled), 0);
}

#[tokio::test(start_paused = true)]
async fn queued_results_are_abandoned_on_shutdown_without_submit() {
    let transport = Arc::new(StubTransport::new(DeliveryOutcome::Acknowledged));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let mut events = handle.subscribe();

    let ids: Vec<_> = (0..3).map(|n| uuid(0x70 + n)).collect();
    for id in &ids {
        handle.intake(TaskResult::new(*id, "queued", true)).await.unwrap();
    }
    handle.shutdown();
    let summary = courier.run().await;

    assert_eq!(summary.abandoned, 3);
    assert_eq!(summary.acknowledged, 0);
    assert_eq!(transport.total_calls(), 0);
    let order: Vec<_> = summary.reports.iter().map(|r| r.task_id).collect();
    assert_eq!(order, ids);
    assert!(summary.reports.iter().all(|r| r.attempts == 0
        && r.disposition == Disposition::Abandoned(AbandonReason::Cancelled)));

    let abandoned = drain(&mut events)
        .into_iter()
        .filter(|e| e.kind == EventKind::Abandoned { reason: AbandonReason::Cancelled })
        .count();
    assert_eq!(abandoned, 3);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_everything_pending() {
    let transport = Arc::new(StubTransport::new(refused()));
    let retry = policy(5).with_backoff(Duration::from_secs(60), Duration::from_secs(60));
    let (courier, handle) = Courier::with_shared(config(retry), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    for n in 0..3 {
        handle.intake(TaskResult::new(uuid(0x10 + n), "x", true)).await.unwrap();
    }
    let mut retrying = 0;
    while retrying < 3 {
        if matches!(events.recv().await.unwrap().kind, EventKind::RetryScheduled { .. }) {
            retrying += 1;
        }
    }
    handle.shutdown();
    let summary = run.await.unwrap();

    assert_eq!(summary.abandoned, 3);
    assert_eq!(summary.acknowledged, 0);
    assert!(summary
        .reports
        .iter()
        .all(|r| r.disposition == Disposition::Abandoned(AbandonReason::Cancelled)));
    assert_eq!(transport.total_calls(), 3);
    assert!(handle.is_shut_down());
    assert!(handle.intake(TaskResult::new(uuid(0x20), "late", true)).await.is_err());
}

// ─── Concurrency and identity ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn results_are_delivered_independently() {
    let slow = uuid(0x30);
    let fast = uuid(0x31);
    let transport = Arc::new(StubTransport::new(DeliveryOutcome::Acknowledged).script(
        slow,
        [refused(), refused()],
    ));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(slow, "slow", true)).await.unwrap();
    handle.intake(TaskResult::new(fast, "fast", true)).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    assert_eq!(summary.acknowledged, 2);
    let order: Vec<_> = summary.reports.iter().map(|r| r.task_id).collect();
    assert_eq!(order, vec![fast, slow]);
}

#[tokio::test(start_paused = true)]
async fn duplicate_intake_while_pending_is_not_submitted_twice() {
    let id = uuid(0x40);
    let transport = Arc::new(StubTransport::new(refused()).script(
        id,
        [refused(), DeliveryOutcome::Acknowledged],
    ));
    let (courier, handle) = Courier::with_shared(config(policy(5)), transport.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    let result = TaskResult::new(id, "x", true);
    handle.intake(result.clone()).await.unwrap();
    handle.intake(result).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(transport.calls_for(id), 2);
    assert!(drain(&mut events)
        .iter()
        .any(|e| e.task_id == id && e.kind == EventKind::DuplicateIgnored));
}

#[tokio::test(start_paused = true)]
async fn resubmitting_a_delivered_result_is_idempotent_at_the_server() {
    let id = uuid(0x50);
    let server = Arc::new(DedupServer::default());
    let (courier, handle) = Courier::with_shared(config(policy(3)), server.clone()).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    let result = TaskResult::new(id, "same", true);
    handle.intake(result.clone()).await.unwrap();
    loop {
        let event = events.recv().await.unwrap();
        if event.task_id == id && event.kind == EventKind::Acknowledged {
            break;
        }
    }
    handle.intake(result.clone()).await.unwrap();
    drop(handle);
    let summary = run.await.unwrap();

    assert_eq!(summary.acknowledged, 2);
    assert_eq!(server.requests(), 2);
    let stored = server.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored.get(&id), Some(&result));
}

#[tokio::test(start_paused = true)]
async fn attempt_events_follow_the_state_machine() {
    let id = uuid(0x60);
    let transport = Arc::new(
        StubTransport::new(DeliveryOutcome::Acknowledged).script(id, [refused()]),
    );
    let (courier, handle) = Courier::with_shared(config(policy(3)), transport).unwrap();
    let mut events = handle.subscribe();
    let run = tokio::spawn(courier.run());

    handle.intake(TaskResult::new(id, "x", true)).await.unwrap();
    drop(handle);
    run.await.unwrap();

    let kinds: Vec<EventKind> = drain(&mut events).into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Accepted,
            EventKind::AttemptStarted,
            EventKind::AttemptFailed { outcome: refused() },
            EventKind::RetryScheduled {
                delay: Duration::from_millis(500)
            },
            EventKind::AttemptStarted,
            EventKind::Acknowledged,
        ]
    );
}
