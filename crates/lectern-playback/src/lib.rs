//! Playback backends and the facade that unifies them.
//!
//! Three backends play segment media: an in-process native player and two
//! third-party video providers embedded in iframes, each speaking its own
//! postMessage dialect. Every backend implements [`PlayerAdapter`]; the
//! [`PlaybackService`] facade owns at most one live adapter at a time and is
//! the only playback surface the rest of the system sees.
//!
//! The facade absorbs the differences that matter:
//!
//! - control calls issued before a backend reports ready are queued in order
//!   and replayed exactly once after readiness, never dropped
//! - position updates are polled from provider backends while playing and
//!   pushed by the native backend, surfacing uniformly as tick events
//! - volume is normalized to `0..1` and seeks clamp to `[0, duration]`
//!   regardless of backend-native scales

#![forbid(unsafe_code)]

pub mod adapter;
pub mod facade;
pub mod native;
pub mod session;
pub mod vimeo;
pub mod youtube;

pub use adapter::{build_adapter, AdapterEvent, EmbedConnector, PlayerAdapter};
pub use facade::{PlaybackEvent, PlaybackService};
pub use native::NativeAdapter;
pub use session::PlaybackSession;
pub use vimeo::VimeoAdapter;
pub use youtube::YouTubeAdapter;
