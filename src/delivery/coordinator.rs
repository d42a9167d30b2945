//! The delivery coordinator.
//!
//! [`Courier`] owns every pending result from intake to its terminal
//! disposition. All deliveries are driven from the single task that awaits
//! [`Courier::run`]: each pending result is one future in a
//! `FuturesUnordered`, so many deliveries make progress concurrently
//! without threads or spawned tasks, and the pending set needs no lock.
//!
//! # Example
//!
//! ```no_run
//! use result_courier::{Courier, CourierConfig, TaskId, TaskResult};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (courier, handle) = Courier::http(CourierConfig::default())?;
//! let run = tokio::spawn(courier.run());
//!
//! handle.intake(TaskResult::new(TaskId::new_v4(), "ok", true)).await?;
//! handle.shutdown();
//! let summary = run.await?;
//! println!("{} acknowledged", summary.acknowledged);
//! # Ok(())
//! # }
//! ```

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::config::{CourierConfig, RetryPolicy};
use crate::constants::{EVENT_CHANNEL_CAPACITY, MAX_SUMMARY_REPORTS};
use crate::delivery::attempt::{AbandonReason, DeliveryAttempt, DeliveryReport, Disposition};
use crate::delivery::event::{DeliveryEvent, EventKind, EventSink};
use crate::delivery::state::{DeliveryState, InvalidTransition};
use crate::error::{ConfigError, CourierError};
use crate::retry::Backoff;
use crate::transport::{DeliveryOutcome, HttpTransport, ResultTransport};
use crate::types::{TaskId, TaskResult};

enum Command {
    Deliver(TaskResult),
    Cancel(TaskId),
}

/// Tally returned by [`Courier::run`] once the coordinator stops.
///
/// The counters cover every result. Only the most recent
/// [`MAX_SUMMARY_REPORTS`] terminal reports are kept; subscribe to
/// [`DeliveryEvent`]s for a complete per-result record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub acknowledged: usize,
    pub abandoned: usize,
    /// Most recent terminal reports, oldest first.
    pub reports: VecDeque<DeliveryReport>,
}

impl ShutdownSummary {
    fn record(&mut self, report: DeliveryReport) {
        if report.disposition.is_acknowledged() {
            self.acknowledged += 1;
        } else {
            self.abandoned += 1;
        }
        if self.reports.len() == MAX_SUMMARY_REPORTS {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
    }

    /// Report for `task_id`, if it reached a terminal disposition and is
    /// still in the retained window.
    pub fn report_for(&self, task_id: TaskId) -> Option<&DeliveryReport> {
        self.reports.iter().find(|r| r.task_id == task_id)
    }
}

/// Cloneable handle for feeding and controlling a running [`Courier`].
#[derive(Debug, Clone)]
pub struct CourierHandle {
    commands: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    events: broadcast::Sender<DeliveryEvent>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deliver(result) => f.debug_tuple("Deliver").field(&result.id()).finish(),
            Self::Cancel(id) => f.debug_tuple("Cancel").field(id).finish(),
        }
    }
}

impl CourierHandle {
    /// Hands a finished result to the coordinator.
    ///
    /// Waits while the intake queue is full; never drops the result.
    pub async fn intake(&self, result: TaskResult) -> Result<(), CourierError> {
        if self.shutdown.is_cancelled() {
            return Err(CourierError::Closed);
        }
        self.commands
            .send(Command::Deliver(result))
            .await
            .map_err(|_| CourierError::Closed)
    }

    /// Cancels a pending result: it skips any remaining attempts and is
    /// abandoned. An attempt already in flight is allowed to finish.
    /// Unknown or already finished ids are ignored.
    pub async fn cancel(&self, task_id: TaskId) -> Result<(), CourierError> {
        self.commands
            .send(Command::Cancel(task_id))
            .await
            .map_err(|_| CourierError::Closed)
    }

    /// Stops intake and abandons everything still pending. In-flight
    /// attempts finish or time out before [`Courier::run`] returns.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Receives every [`DeliveryEvent`] emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.events.subscribe()
    }
}

/// Delivery coordinator.
pub struct Courier<T: ?Sized> {
    transport: Arc<T>,
    policy: RetryPolicy,
    commands: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
    events: EventSink,
}

impl<T: ?Sized> std::fmt::Debug for Courier<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Courier")
            .field("policy", &self.policy)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl Courier<HttpTransport> {
    /// Builds a courier posting to `config.endpoint` over HTTP(S).
    pub fn http(config: CourierConfig) -> Result<(Self, CourierHandle), ConfigError> {
        let transport = HttpTransport::new(&config.endpoint, config.retry.attempt_timeout())?;
        Self::new(config, transport)
    }
}

impl<T: ResultTransport + 'static> Courier<T> {
    /// Builds a courier over `transport`. The configuration is validated
    /// and then fixed for the courier's lifetime.
    pub fn new(config: CourierConfig, transport: T) -> Result<(Self, CourierHandle), ConfigError> {
        Self::with_shared(config, Arc::new(transport))
    }
}

impl<T: ResultTransport + ?Sized + 'static> Courier<T> {
    /// Like [`Courier::new`], for a transport that is shared or unsized
    /// (`Arc<dyn ResultTransport>`).
    pub fn with_shared(
        config: CourierConfig,
        transport: Arc<T>,
    ) -> Result<(Self, CourierHandle), ConfigError> {
        config.validate()?;
        let (command_tx, command_rx) = mpsc::channel(config.intake_capacity);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        let handle = CourierHandle {
            commands: command_tx,
            shutdown: shutdown.clone(),
            events: event_tx.clone(),
        };
        let courier = Self {
            transport,
            policy: config.retry,
            commands: command_rx,
            shutdown,
            events: EventSink::new(event_tx),
        };
        Ok((courier, handle))
    }

    /// Token that triggers the same shutdown as [`CourierHandle::shutdown`]
    /// without keeping intake open.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the event loop until [`CourierHandle::shutdown`] is called or
    /// every handle is dropped and all pending results are finished.
    pub async fn run(mut self) -> ShutdownSummary {
        let mut pending: HashMap<TaskId, CancellationToken> = HashMap::new();
        let mut deliveries: FuturesUnordered<BoxFuture<'static, DeliveryReport>> =
            FuturesUnordered::new();
        let mut summary = ShutdownSummary::default();

        tracing::info!(policy = ?self.policy, "courier started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                // Commands before deliveries: a cancel queued behind its
                // intake must land while the result is still Pending.
                command = self.commands.recv() => match command {
                    Some(Command::Deliver(result)) => {
                        let task_id = result.id();
                        if pending.contains_key(&task_id) {
                            self.events.emit(DeliveryEvent::new(
                                task_id,
                                EventKind::DuplicateIgnored,
                                0,
                                std::time::Duration::ZERO,
                            ));
                            continue;
                        }
                        let cancel = self.shutdown.child_token();
                        pending.insert(task_id, cancel.clone());
                        deliveries.push(
                            deliver(
                                result,
                                Arc::clone(&self.transport),
                                self.policy.clone(),
                                cancel,
                                self.events.clone(),
                            )
                            .boxed(),
                        );
                    }
                    Some(Command::Cancel(task_id)) => match pending.get(&task_id) {
                        Some(cancel) => cancel.cancel(),
                        None => tracing::debug!(task_id = %task_id, "cancel for unknown task ignored"),
                    },
                    None => {
                        tracing::debug!("all courier handles dropped; draining pending results");
                        break;
                    }
                },

                Some(report) = deliveries.next(), if !deliveries.is_empty() => {
                    pending.remove(&report.task_id);
                    summary.record(report);
                }
            }
        }

        if self.shutdown.is_cancelled() {
            // Nothing new gets in; queued results are abandoned in order.
            self.commands.close();
            while let Ok(command) = self.commands.try_recv() {
                if let Command::Deliver(result) = command {
                    let mut attempt = DeliveryAttempt::new(result);
                    let disposition = abandon(&mut attempt, AbandonReason::Cancelled, &self.events);
                    summary.record(attempt.report(disposition));
                }
            }
            for cancel in pending.values() {
                cancel.cancel();
            }
        }

        while let Some(report) = deliveries.next().await {
            summary.record(report);
        }

        tracing::info!(
            acknowledged = summary.acknowledged,
            abandoned = summary.abandoned,
            "courier stopped"
        );
        summary
    }
}

/// Drives one result to a terminal disposition.
///
/// Attempts are strictly sequential. Retryable outcomes back off per
/// `policy`; `cancel` abandons the result at the next point where no
/// attempt is outstanding.
pub(crate) async fn deliver<T: ResultTransport + ?Sized>(
    result: TaskResult,
    transport: Arc<T>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    events: EventSink,
) -> DeliveryReport {
    let mut attempt = DeliveryAttempt::new(result);
    events.emit(event(&attempt, EventKind::Accepted));

    let disposition = match drive(&mut attempt, &*transport, &policy, &cancel, &events).await {
        Ok(disposition) => disposition,
        Err(err) => {
            tracing::error!(error = %err, "delivery state machine violated");
            let reason = AbandonReason::Internal(err.to_string());
            force_abandon(&mut attempt, reason, &events)
        }
    };
    attempt.report(disposition)
}

async fn drive<T: ResultTransport + ?Sized>(
    attempt: &mut DeliveryAttempt,
    transport: &T,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    events: &EventSink,
) -> Result<Disposition, InvalidTransition> {
    let backoff = Backoff::new(policy);
    let body = codec::encode(attempt.result());

    loop {
        if cancel.is_cancelled() {
            return try_abandon(attempt, AbandonReason::Cancelled, events);
        }

        attempt.begin_attempt()?;
        events.emit(event(attempt, EventKind::AttemptStarted));

        // Not raced against `cancel`: an in-flight attempt completes or
        // times out, it is never dropped half-way.
        let submission = transport.submit(body.clone());
        let outcome = match tokio::time::timeout(policy.attempt_timeout(), submission).await {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::Unavailable(format!(
                "attempt timed out after {}ms",
                policy.attempt_timeout_ms
            )),
        };

        match outcome {
            DeliveryOutcome::Acknowledged => {
                attempt.transition(DeliveryState::Acknowledged)?;
                events.emit(event(attempt, EventKind::Acknowledged));
                return Ok(Disposition::Acknowledged);
            }
            DeliveryOutcome::Rejected(reason) => {
                let outcome = DeliveryOutcome::Rejected(reason.clone());
                attempt.record_failure(outcome.clone());
                events.emit(event(attempt, EventKind::AttemptFailed { outcome }));
                return try_abandon(attempt, AbandonReason::Rejected(reason), events);
            }
            DeliveryOutcome::Unavailable(_) | DeliveryOutcome::Unreachable(_) => {
                attempt.record_failure(outcome.clone());
                events.emit(event(
                    attempt,
                    EventKind::AttemptFailed {
                        outcome: outcome.clone(),
                    },
                ));

                if cancel.is_cancelled() {
                    return try_abandon(attempt, AbandonReason::Cancelled, events);
                }
                if attempt.attempts() >= policy.max_attempts {
                    return try_abandon(
                        attempt,
                        AbandonReason::RetryBudgetExhausted { last: outcome },
                        events,
                    );
                }
                let delay = backoff.delay(attempt.attempts());
                if let Some(max_elapsed) = policy.max_elapsed() {
                    if attempt.elapsed() + delay > max_elapsed {
                        return try_abandon(
                            attempt,
                            AbandonReason::RetryBudgetExhausted { last: outcome },
                            events,
                        );
                    }
                }

                attempt.schedule_retry(outcome, Instant::now() + delay)?;
                events.emit(event(attempt, EventKind::RetryScheduled { delay }));

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return try_abandon(attempt, AbandonReason::Cancelled, events);
                    }
                }
                attempt.resume()?;
            }
        }
    }
}

fn event(attempt: &DeliveryAttempt, kind: EventKind) -> DeliveryEvent {
    DeliveryEvent::new(attempt.task_id(), kind, attempt.attempts(), attempt.elapsed())
}

fn try_abandon(
    attempt: &mut DeliveryAttempt,
    reason: AbandonReason,
    events: &EventSink,
) -> Result<Disposition, InvalidTransition> {
    attempt.transition(DeliveryState::Abandoned)?;
    events.emit(event(attempt, EventKind::Abandoned { reason: reason.clone() }));
    Ok(Disposition::Abandoned(reason))
}

/// Abandons a result that never left `Pending`.
fn abandon(attempt: &mut DeliveryAttempt, reason: AbandonReason, events: &EventSink) -> Disposition {
    try_abandon(attempt, reason.clone(), events)
        .unwrap_or_else(|_| force_abandon(attempt, reason, events))
}

/// Terminal fallback when the state machine refused a transition.
fn force_abandon(attempt: &mut DeliveryAttempt, reason: AbandonReason, events: &EventSink) -> Disposition {
    if !attempt.state().is_terminal() {
        let _ = attempt.transition(DeliveryState::Abandoned);
    }
    events.emit(event(attempt, EventKind::Abandoned { reason: reason.clone() }));
    Disposition::Abandoned(reason)
}
