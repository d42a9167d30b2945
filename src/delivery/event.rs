//! Observability events emitted on every delivery transition.
//!
//! Every event is logged through `tracing` and, when anyone subscribed via
//! [`CourierHandle::subscribe`](crate::CourierHandle::subscribe), broadcast
//! as a [`DeliveryEvent`] value.

use std::time::Duration;
use tokio::sync::broadcast;

use crate::delivery::attempt::AbandonReason;
use crate::transport::DeliveryOutcome;
use crate::types::TaskId;

/// What happened to a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Taken in by the coordinator (state `Pending`).
    Accepted,
    /// A submit call started (state `InFlight`).
    AttemptStarted,
    /// A submit call finished without acknowledgement.
    AttemptFailed { outcome: DeliveryOutcome },
    /// Waiting `delay` before the next attempt (state `Retrying`).
    RetryScheduled { delay: Duration },
    /// Terminal success.
    Acknowledged,
    /// Terminal failure.
    Abandoned { reason: AbandonReason },
    /// A result with this id was already pending; the duplicate was not
    /// started.
    DuplicateIgnored,
}

/// One observability event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEvent {
    pub task_id: TaskId,
    pub kind: EventKind,
    /// Attempts issued so far.
    pub attempt: u32,
    /// Time since intake.
    pub elapsed: Duration,
}

impl DeliveryEvent {
    pub fn new(task_id: TaskId, kind: EventKind, attempt: u32, elapsed: Duration) -> Self {
        Self {
            task_id,
            kind,
            attempt,
            elapsed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Acknowledged | EventKind::Abandoned { .. })
    }
}

/// Logs events and fans them out to subscribers.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: broadcast::Sender<DeliveryEvent>,
}

impl EventSink {
    pub(crate) fn new(sender: broadcast::Sender<DeliveryEvent>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: DeliveryEvent) {
        log_event(&event);
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

fn log_event(event: &DeliveryEvent) {
    let task_id = event.task_id;
    let attempt = event.attempt;
    let elapsed_ms = event.elapsed.as_millis() as u64;
    match &event.kind {
        EventKind::Accepted => {
            tracing::debug!(task_id = %task_id, "result accepted for delivery")
        }
        EventKind::AttemptStarted => {
            tracing::debug!(task_id = %task_id, attempt, elapsed_ms, "submitting result")
        }
        EventKind::AttemptFailed { outcome } => tracing::warn!(
            task_id = %task_id,
            attempt,
            elapsed_ms,
            outcome = outcome.label(),
            reason = outcome.reason().unwrap_or_default(),
            "submission attempt failed"
        ),
        EventKind::RetryScheduled { delay } => tracing::info!(
            task_id = %task_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        ),
        EventKind::Acknowledged => {
            tracing::info!(task_id = %task_id, attempt, elapsed_ms, "result acknowledged")
        }
        EventKind::Abandoned {
            reason: AbandonReason::Cancelled,
        } => tracing::warn!(task_id = %task_id, attempt, elapsed_ms, "result abandoned: cancelled"),
        EventKind::Abandoned { reason } => tracing::error!(
            task_id = %task_id,
            attempt,
            elapsed_ms,
            reason = %reason,
            "result abandoned"
        ),
        EventKind::DuplicateIgnored => {
            tracing::warn!(task_id = %task_id, "result already pending; duplicate ignored")
        }
    }
}
