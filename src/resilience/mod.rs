//! Resilience subsystem.
//!
//! One concern lives here: the wall-clock deadline applied to every unit of
//! connection-handling work.

pub mod timeout;

pub use timeout::{with_deadline, DeadlineBody};
