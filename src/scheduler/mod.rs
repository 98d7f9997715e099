//! Recurring backup scheduler.
//!
//! Wakes on a fixed tick, backs up every due task, and re-arms a task only
//! once its archive reached every recipient.

pub mod runner;

pub use runner::{Clock, Scheduler, TickReport};
pub(crate) use runner::{blocking_with_timeout, compress_with_timeout, deliver_with_timeout};
