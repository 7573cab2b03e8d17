//! Lesson runtime for the trusted host side of a lesson session.
//!
//! This crate ties the other Lectern pieces together. A [`LessonRuntime`]
//! binds a correlation channel over the port that reaches embedded content,
//! registers a handler for every request the content protocol defines, and
//! routes those requests to three places:
//!
//! - host capabilities ([`capability::ProgressStore`], [`capability::ChatSurface`])
//!   supplied by the embedding application,
//! - the playback facade from `lectern-playback` for media control, and
//! - the progression engine from `lectern-progression` for pacing decisions.
//!
//! Playback state changes are pumped into the engine and echoed to content
//! subscribers, so an embedded frame can follow the same media the host is
//! driving. Progression decisions (`Advance`, `AwaitConfirmation`) flow out
//! through a receiver handed back from [`LessonRuntime::start`].

#![forbid(unsafe_code)]

pub mod capability;
pub mod handlers;
pub mod runtime;
pub mod state;

pub use capability::{ChatSurface, ProgressStore};
pub use runtime::{HostCapabilities, LessonRuntime, PLAYBACK_TOPIC};
pub use state::SessionState;
