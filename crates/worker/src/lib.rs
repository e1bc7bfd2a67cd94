#![cfg_attr(test, allow(unused_crate_dependencies))]

//! Worker primitives for the Lamina dispatch core.
//!
//! The dispatcher runs on a dedicated named thread spawned through
//! [`spawn_named_thread`]; background filters run on the shared blocking pool
//! through [`spawn_blocking`]. Ids for locks, filter jobs and sandboxes come
//! from [`SequenceClock`], and filter interrupts travel through
//! [`InterruptToken`].

mod class;
mod registry;
mod spawn;
mod token;

pub use class::TaskClass;
pub use registry::{JobRecord, JobState, WorkerRegistry};
pub use spawn::{panic_message, spawn_blocking, spawn_named_thread};
pub use token::{InterruptToken, SequenceClock};
