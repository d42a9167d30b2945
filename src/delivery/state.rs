//! Per-result delivery state machine.

use std::fmt;

use crate::types::TaskId;

/// Where a pending result stands in its delivery lifecycle.
///
/// # State Machine
///
/// ```text
/// Pending  -> InFlight, Abandoned (cancelled before an attempt)
/// InFlight -> Acknowledged, Retrying, Abandoned
/// Retrying -> Pending, Abandoned (cancelled during backoff)
/// Acknowledged -> (terminal)
/// Abandoned    -> (terminal)
/// ```
///
/// # Examples
///
/// ```
/// use result_courier::DeliveryState;
///
/// assert!(DeliveryState::Pending.can_transition_to(&DeliveryState::InFlight));
/// assert!(!DeliveryState::Pending.can_transition_to(&DeliveryState::Acknowledged));
/// assert!(DeliveryState::Abandoned.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// Received, waiting for its next attempt.
    Pending,
    /// A submit call is outstanding.
    InFlight,
    /// A retryable outcome occurred; waiting out the backoff delay.
    Retrying,
    /// The listening post accepted the result (terminal).
    Acknowledged,
    /// Given up: rejected, out of retry budget, or cancelled (terminal).
    Abandoned,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Retrying => write!(f, "retrying"),
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

impl DeliveryState {
    /// Returns `true` for `Acknowledged` and `Abandoned`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Abandoned)
    }

    /// Returns `true` if moving from this state to `next` is allowed.
    /// Self-transitions are rejected.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::InFlight | Self::Abandoned),
            Self::InFlight => matches!(
                next,
                Self::Acknowledged | Self::Retrying | Self::Abandoned
            ),
            Self::Retrying => matches!(next, Self::Pending | Self::Abandoned),
            Self::Acknowledged | Self::Abandoned => false,
        }
    }

    /// Validates a transition, returning [`InvalidTransition`] with context
    /// when it is not allowed.
    pub fn validate_transition(&self, task_id: TaskId, next: &Self) -> Result<(), InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(InvalidTransition {
                task_id,
                from: *self,
                to: *next,
            })
        }
    }
}

/// A state change the delivery state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid delivery transition from {from} to {to} for task {task_id}")]
pub struct InvalidTransition {
    pub task_id: TaskId,
    pub from: DeliveryState,
    pub to: DeliveryState,
}
