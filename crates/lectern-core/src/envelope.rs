//! Wire envelope and message vocabulary
//!
//! Every frame crossing the correlation channel is one JSON [`Envelope`]:
//! a [`MessageKind`] plus optional correlation/subscription ids and a JSON
//! object payload. Field names are camelCase on the wire because the far
//! end of the channel is embedded JavaScript content.
//!
//! Invariants:
//! - a request envelope always carries a fresh, process-unique
//!   `correlationId`
//! - a `response` envelope echoes the `correlationId` of the request it
//!   answers, or carries the `subscriptionId` of the stream it belongs to
//! - at most one response is delivered per request

use crate::errors::{LecternError, Result};
use crate::ids::{CorrelationId, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON object payload carried by an envelope
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Closed vocabulary of message kinds understood by the host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// Content-originated event, re-broadcast to subscribers of its topic
    EmitEvent,
    /// Write a value into the runtime-scoped session state
    UpdateState,
    /// Read a value from the runtime-scoped session state
    GetState,
    /// Open a durable host-broadcast stream for a topic
    Subscribe,
    /// Close a previously opened stream
    Unsubscribe,
    /// Collapse the chat surface
    MinimizeChatUi,
    /// Restore the chat surface
    ShowChatUi,
    /// Enter fullscreen presentation
    ActivateFullscreen,
    /// Leave fullscreen presentation
    DeactivateFullscreen,
    /// Post a message into the lesson chat
    PostToChat,
    /// Reveal the current script text
    ShowScript,
    /// Show a transient notification
    ShowSnack,
    /// Dismiss the transient notification
    HideSnack,
    /// Persist interaction instance data
    SaveInstanceData,
    /// Fetch prior interaction instance data
    GetInstanceDataHistory,
    /// Persist learner progress
    SaveUserProgress,
    /// Fetch learner progress
    GetUserProgress,
    /// Mark the current interaction completed in the progress store
    MarkCompleted,
    /// Increment the learner's attempt counter
    IncrementAttempts,
    /// Fetch the learner's public profile
    GetUserPublicProfile,
    /// Start media playback
    PlayMedia,
    /// Pause media playback
    PauseMedia,
    /// Seek media to a position in seconds
    SeekMedia,
    /// Set media volume (normalized 0..1)
    SetMediaVolume,
    /// Query the current media position
    GetMediaCurrentTime,
    /// Query the media duration
    GetMediaDuration,
    /// Query whether media is playing
    IsMediaPlaying,
    /// Display host-rendered overlay HTML
    ShowOverlayHtml,
    /// Remove the overlay HTML
    HideOverlayHtml,
    /// Content signals the interaction is finished
    CompleteInteraction,
    /// Host → content handshake: the session context is bound and calls
    /// may now be issued
    Ready,
    /// Answer to a request, or a pushed subscription delivery
    Response,
}

impl MessageKind {
    /// Every kind in the vocabulary, in declaration order
    pub const ALL: [MessageKind; 32] = [
        MessageKind::EmitEvent,
        MessageKind::UpdateState,
        MessageKind::GetState,
        MessageKind::Subscribe,
        MessageKind::Unsubscribe,
        MessageKind::MinimizeChatUi,
        MessageKind::ShowChatUi,
        MessageKind::ActivateFullscreen,
        MessageKind::DeactivateFullscreen,
        MessageKind::PostToChat,
        MessageKind::ShowScript,
        MessageKind::ShowSnack,
        MessageKind::HideSnack,
        MessageKind::SaveInstanceData,
        MessageKind::GetInstanceDataHistory,
        MessageKind::SaveUserProgress,
        MessageKind::GetUserProgress,
        MessageKind::MarkCompleted,
        MessageKind::IncrementAttempts,
        MessageKind::GetUserPublicProfile,
        MessageKind::PlayMedia,
        MessageKind::PauseMedia,
        MessageKind::SeekMedia,
        MessageKind::SetMediaVolume,
        MessageKind::GetMediaCurrentTime,
        MessageKind::GetMediaDuration,
        MessageKind::IsMediaPlaying,
        MessageKind::ShowOverlayHtml,
        MessageKind::HideOverlayHtml,
        MessageKind::CompleteInteraction,
        MessageKind::Ready,
        MessageKind::Response,
    ];

    /// Wire name of the kind (kebab-case)
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::EmitEvent => "emit-event",
            MessageKind::UpdateState => "update-state",
            MessageKind::GetState => "get-state",
            MessageKind::Subscribe => "subscribe",
            MessageKind::Unsubscribe => "unsubscribe",
            MessageKind::MinimizeChatUi => "minimize-chat-ui",
            MessageKind::ShowChatUi => "show-chat-ui",
            MessageKind::ActivateFullscreen => "activate-fullscreen",
            MessageKind::DeactivateFullscreen => "deactivate-fullscreen",
            MessageKind::PostToChat => "post-to-chat",
            MessageKind::ShowScript => "show-script",
            MessageKind::ShowSnack => "show-snack",
            MessageKind::HideSnack => "hide-snack",
            MessageKind::SaveInstanceData => "save-instance-data",
            MessageKind::GetInstanceDataHistory => "get-instance-data-history",
            MessageKind::SaveUserProgress => "save-user-progress",
            MessageKind::GetUserProgress => "get-user-progress",
            MessageKind::MarkCompleted => "mark-completed",
            MessageKind::IncrementAttempts => "increment-attempts",
            MessageKind::GetUserPublicProfile => "get-user-public-profile",
            MessageKind::PlayMedia => "play-media",
            MessageKind::PauseMedia => "pause-media",
            MessageKind::SeekMedia => "seek-media",
            MessageKind::SetMediaVolume => "set-media-volume",
            MessageKind::GetMediaCurrentTime => "get-media-current-time",
            MessageKind::GetMediaDuration => "get-media-duration",
            MessageKind::IsMediaPlaying => "is-media-playing",
            MessageKind::ShowOverlayHtml => "show-overlay-html",
            MessageKind::HideOverlayHtml => "hide-overlay-html",
            MessageKind::CompleteInteraction => "complete-interaction",
            MessageKind::Ready => "ready",
            MessageKind::Response => "response",
        }
    }

    /// True for the `response` kind
    pub fn is_response(&self) -> bool {
        matches!(self, MessageKind::Response)
    }

    /// True for kinds that expect exactly one response when sent as a
    /// request. `emit-event` and `ready` are one-way notifications and
    /// `response` answers rather than asks.
    pub fn expects_response(&self) -> bool {
        !matches!(
            self,
            MessageKind::EmitEvent | MessageKind::Ready | MessageKind::Response
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame crossing the correlation channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message kind from the closed vocabulary
    pub kind: MessageKind,
    /// Pairs a request with its response; fresh per request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Tags a pushed delivery with the stream it belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    /// JSON object payload
    #[serde(default, skip_serializing_if = "Payload::is_empty")]
    pub payload: Payload,
}

impl Envelope {
    /// Build a request envelope with a fresh correlation id
    pub fn request(kind: MessageKind, payload: Payload) -> (Self, CorrelationId) {
        let correlation_id = CorrelationId::new();
        (
            Self {
                kind,
                correlation_id: Some(correlation_id),
                subscription_id: None,
                payload,
            },
            correlation_id,
        )
    }

    /// Build the response to a request
    pub fn response(correlation_id: CorrelationId, payload: Payload) -> Self {
        Self {
            kind: MessageKind::Response,
            correlation_id: Some(correlation_id),
            subscription_id: None,
            payload,
        }
    }

    /// Build a fire-and-forget event envelope (no correlation id)
    pub fn event(kind: MessageKind, payload: Payload) -> Self {
        Self {
            kind,
            correlation_id: None,
            subscription_id: None,
            payload,
        }
    }

    /// Build a pushed subscription delivery
    pub fn stream(subscription_id: SubscriptionId, payload: Payload) -> Self {
        Self {
            kind: MessageKind::Response,
            correlation_id: None,
            subscription_id: Some(subscription_id),
            payload,
        }
    }

    /// Serialize to a JSON text frame
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LecternError::serialization(format!("encode envelope: {e}")))
    }

    /// Parse a JSON text frame and check routing invariants.
    ///
    /// Frames that fail here are dropped at the channel boundary; the error
    /// carries the reason for the log line.
    pub fn decode(frame: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(frame)
            .map_err(|e| LecternError::protocol(format!("unparseable frame: {e}")))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check routing invariants on an already-parsed envelope
    pub fn validate(&self) -> Result<()> {
        if self.kind.is_response() && self.correlation_id.is_none() && self.subscription_id.is_none()
        {
            return Err(LecternError::protocol(
                "response frame carries neither correlation nor subscription id",
            ));
        }
        if !self.kind.is_response() && self.subscription_id.is_some() {
            return Err(LecternError::protocol(format!(
                "{} frame carries a subscription id",
                self.kind
            )));
        }
        Ok(())
    }
}
