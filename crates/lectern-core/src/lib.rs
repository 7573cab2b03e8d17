//! Lectern Core - Shared Types for the Lesson Runtime
//!
//! This crate provides the foundational types every other Lectern crate
//! builds on. It contains only data definitions and pure contracts, no
//! runtime logic:
//!
//! - Wire [`Envelope`] and the closed [`MessageKind`] vocabulary exchanged
//!   between the host runtime and embedded content
//! - Identifier newtypes ([`CorrelationId`], [`SubscriptionId`], ...)
//! - The lesson [`Segment`] model and playback backend selection
//! - The unified [`LecternError`] taxonomy and [`Result`] alias
//! - The [`Clock`] seam used by every time-dependent component
//! - Configuration structs with conservative defaults

#![forbid(unsafe_code)]

/// Monotonic clock seam for deterministic time handling
pub mod clock;

/// Configuration types for the channel, playback, and progression layers
pub mod config;

/// Wire envelope and message vocabulary
pub mod envelope;

/// Unified error handling
pub mod errors;

/// Identifier newtypes
pub mod ids;

/// Typed payload structs carried inside envelopes
pub mod payload;

/// Lesson segment and media source model
pub mod segment;

pub use clock::{Clock, MonotonicClock};
pub use config::{ChannelConfig, LessonRuntimeConfig, PlaybackConfig, ProgressionConfig};
pub use envelope::{Envelope, MessageKind, Payload};
pub use errors::{LecternError, Result};
pub use ids::{CorrelationId, PlaybackSessionId, SegmentId, SubscriptionId};
pub use segment::{BackendKind, MediaSource, Segment};
