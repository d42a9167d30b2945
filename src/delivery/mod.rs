//! Delivery coordination: state machine, per-result bookkeeping,
//! observability events and the [`Courier`] event loop.

pub mod attempt;
pub mod coordinator;
pub mod event;
pub mod state;

pub use attempt::{AbandonReason, DeliveryAttempt, DeliveryReport, Disposition};
pub use coordinator::{Courier, CourierHandle, ShutdownSummary};
pub use event::{DeliveryEvent, EventKind};
pub use state::{DeliveryState, InvalidTransition};
