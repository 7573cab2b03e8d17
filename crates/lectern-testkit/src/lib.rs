//! Test doubles shared across the workspace.
//!
//! Provides the pieces integration tests keep rebuilding: a hand-driven
//! clock, scripted embed players that speak the real provider dialects
//! over in-process ports, a connector that hands those embeds to the
//! playback facade, and in-memory capability fakes for the lesson runtime.
//!
//! Add to a crate's `Cargo.toml` dev-dependencies:
//! ```toml
//! [dev-dependencies]
//! lectern-testkit = { path = "../lectern-testkit" }
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod capabilities;
pub mod clock;
pub mod embeds;
pub mod logging;

pub use capabilities::{ChatAction, MemoryProgressStore, RecordingChat};
pub use clock::ManualClock;
pub use embeds::{FakeConnector, FakeEmbeddedPlayer, RecordedCommand};
pub use logging::init_test_logging;
