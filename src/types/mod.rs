//! Value types carried through the delivery pipeline.
//!
//! - [`TaskId`] - 128-bit task identifier echoed back to the listening post
//! - [`TaskResult`] - immutable outcome of one finished task

pub mod id;
pub mod result;

pub use id::TaskId;
pub use result::TaskResult;
