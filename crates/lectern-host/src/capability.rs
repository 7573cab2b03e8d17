//! Capability seams the embedding application implements.
//!
//! Embedded content never talks to storage or to the surrounding UI
//! directly. Every such request arrives over the channel and is routed
//! through one of these traits, so the embedding application decides what
//! "persist progress" or "post to chat" actually means in its environment.
//! A capability the application cannot provide should fail with
//! [`LecternError::capability_unavailable`](lectern_core::LecternError::capability_unavailable);
//! the error travels back to the calling frame as a structured response.

use async_trait::async_trait;
use serde_json::Value;

use lectern_core::Result;

/// Persistence backend for interaction data and learner progress.
///
/// All methods are scoped to the current learner and lesson instance; the
/// implementation carries those identifiers, not the caller.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Append one opaque blob of interaction instance data.
    async fn save_instance_data(&self, data: Value) -> Result<()>;

    /// Return every saved instance-data blob, oldest first.
    async fn instance_data_history(&self) -> Result<Vec<Value>>;

    /// Overwrite the learner's saved progress for this interaction.
    async fn save_user_progress(&self, progress: Value) -> Result<()>;

    /// Return the learner's saved progress, or `None` when nothing has
    /// been saved yet. Absence is a normal answer, not a failure.
    async fn user_progress(&self) -> Result<Option<Value>>;

    /// Record that the learner completed this interaction.
    async fn mark_completed(&self) -> Result<()>;

    /// Bump the learner's attempt counter and return the new count.
    async fn increment_attempts(&self) -> Result<u32>;

    /// Return the learner's public profile (display name, avatar, ...).
    async fn public_profile(&self) -> Result<Value>;
}

/// Chat, script, and overlay surface of the embedding UI.
///
/// These calls are fire-and-forget from the content's point of view but
/// still acknowledged over the channel, so implementations should return
/// once the request has been accepted rather than once any animation has
/// finished.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Post a message into the lesson chat on the content's behalf.
    async fn post_to_chat(&self, message: &str) -> Result<()>;

    /// Reveal the script text for the current segment.
    async fn show_script(&self) -> Result<()>;

    /// Show a transient notification.
    async fn show_snack(&self, text: &str) -> Result<()>;

    /// Dismiss the current transient notification, if any.
    async fn hide_snack(&self) -> Result<()>;

    /// Collapse or restore the chat column.
    async fn set_chat_minimized(&self, minimized: bool) -> Result<()>;

    /// Enter or leave fullscreen presentation of the content frame.
    async fn set_fullscreen(&self, fullscreen: bool) -> Result<()>;

    /// Render a block of host-sanitized HTML above the content frame.
    async fn show_overlay_html(&self, html: &str) -> Result<()>;

    /// Remove the overlay again.
    async fn hide_overlay_html(&self) -> Result<()>;
}
