//! Bookkeeping for one pending result and its terminal report.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::delivery::state::{DeliveryState, InvalidTransition};
use crate::transport::DeliveryOutcome;
use crate::types::{TaskId, TaskResult};

/// Why a result was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// The listening post rejected the payload; it was not retried.
    Rejected(String),
    /// Every allowed attempt failed, or the next wait would overrun the
    /// elapsed-time bound.
    RetryBudgetExhausted {
        /// Outcome of the final attempt.
        last: DeliveryOutcome,
    },
    /// Cancelled explicitly or by shutdown.
    Cancelled,
    /// The state machine refused a transition. Indicates a bug.
    Internal(String),
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::RetryBudgetExhausted { last } => {
                write!(f, "retry budget exhausted (last outcome {last})")
            }
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

/// Terminal disposition of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Acknowledged,
    Abandoned(AbandonReason),
}

impl Disposition {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }

    /// The matching terminal [`DeliveryState`].
    pub fn state(&self) -> DeliveryState {
        match self {
            Self::Acknowledged => DeliveryState::Acknowledged,
            Self::Abandoned(_) => DeliveryState::Abandoned,
        }
    }
}

/// Final record of one result's delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub task_id: TaskId,
    pub disposition: Disposition,
    /// Submit calls issued.
    pub attempts: u32,
    /// Time from intake to the terminal disposition.
    pub elapsed: Duration,
}

/// Live state of a result pending delivery.
///
/// Owned by exactly one delivery future; never shared.
#[derive(Debug)]
pub struct DeliveryAttempt {
    result: TaskResult,
    state: DeliveryState,
    attempts: u32,
    last_error: Option<DeliveryOutcome>,
    next_retry_at: Option<Instant>,
    started: Instant,
}

impl DeliveryAttempt {
    pub fn new(result: TaskResult) -> Self {
        Self {
            result,
            state: DeliveryState::Pending,
            attempts: 0,
            last_error: None,
            next_retry_at: None,
            started: Instant::now(),
        }
    }

    pub fn result(&self) -> &TaskResult {
        &self.result
    }

    pub fn task_id(&self) -> TaskId {
        self.result.id()
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&DeliveryOutcome> {
        self.last_error.as_ref()
    }

    pub fn next_retry_at(&self) -> Option<Instant> {
        self.next_retry_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Moves to `next` if the state machine allows it.
    pub fn transition(&mut self, next: DeliveryState) -> Result<(), InvalidTransition> {
        self.state.validate_transition(self.task_id(), &next)?;
        self.state = next;
        Ok(())
    }

    /// Pending -> InFlight, counting the attempt.
    pub fn begin_attempt(&mut self) -> Result<(), InvalidTransition> {
        self.transition(DeliveryState::InFlight)?;
        self.attempts += 1;
        Ok(())
    }

    /// InFlight -> Retrying after a retryable `outcome`, due again at `at`.
    pub fn schedule_retry(
        &mut self,
        outcome: DeliveryOutcome,
        at: Instant,
    ) -> Result<(), InvalidTransition> {
        self.transition(DeliveryState::Retrying)?;
        self.last_error = Some(outcome);
        self.next_retry_at = Some(at);
        Ok(())
    }

    /// Retrying -> Pending once the backoff delay has elapsed.
    pub fn resume(&mut self) -> Result<(), InvalidTransition> {
        self.transition(DeliveryState::Pending)?;
        self.next_retry_at = None;
        Ok(())
    }

    /// Records a failed outcome without changing state.
    pub fn record_failure(&mut self, outcome: DeliveryOutcome) {
        self.last_error = Some(outcome);
    }

    /// Builds the terminal report.
    pub fn report(&self, disposition: Disposition) -> DeliveryReport {
        DeliveryReport {
            task_id: self.task_id(),
            disposition,
            attempts: self.attempts,
            elapsed: self.elapsed(),
        }
    }
}
