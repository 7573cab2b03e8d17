//! Lesson progression.
//!
//! Decides when a lesson moves from one segment to the next. Each active
//! segment gets a pausable [`Deadline`] sized to
//! `max(minimum floor, script allocation)` and extended to the content
//! duration once a backend reports one. When the deadline expires, or the
//! content finishes first, the [`ProgressionEngine`] either advances
//! automatically or holds for an explicit learner confirmation, depending
//! on the segment's auto-progress flag.

#![forbid(unsafe_code)]

pub mod deadline;
pub mod engine;

pub use deadline::Deadline;
pub use engine::{ProgressionEngine, ProgressionEvent, ProgressionPhase};
