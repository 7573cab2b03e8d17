//! Typed payload structs carried inside envelopes
//!
//! Envelope payloads stay schemaless JSON objects at the channel layer;
//! these structs give them shape at the call sites that produce and consume
//! them. Multi-word fields serialize camelCase to match the wire dialect.

use crate::envelope::Payload;
use crate::errors::{LecternError, Result};
use crate::ids::SubscriptionId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialize a typed payload struct into an envelope payload object
pub fn to_payload<T: Serialize>(value: &T) -> Result<Payload> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(LecternError::serialization(format!(
            "payload must be a JSON object, got {other}"
        ))),
    }
}

/// Deserialize an envelope payload object into a typed payload struct
pub fn from_payload<T: DeserializeOwned>(payload: &Payload) -> Result<T> {
    serde_json::from_value(Value::Object(payload.clone()))
        .map_err(|e| LecternError::serialization(format!("decode payload: {e}")))
}

/// Empty payload object
pub fn empty() -> Payload {
    Payload::new()
}

/// Failure response payload: `error` is always present, `code` classifies
/// the failure for callers that branch on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable failure detail
    pub error: String,
    /// Machine-readable failure class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

/// Machine-readable failure classes carried in error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// No handler registered for the requested kind
    CapabilityUnavailable,
    /// Playback backend failure
    Backend,
    /// The owning session was torn down
    Cancelled,
    /// The operation timed out on the serving side
    Timeout,
    /// Anything else
    Internal,
}

impl ErrorCode {
    /// Wire name of the code (kebab-case)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CapabilityUnavailable => "capability-unavailable",
            ErrorCode::Backend => "backend",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Internal => "internal",
        }
    }
}

impl ErrorPayload {
    /// Classify a runtime error into a wire error payload
    pub fn from_error(err: &LecternError) -> Self {
        let code = match err {
            LecternError::CapabilityUnavailable { .. } => ErrorCode::CapabilityUnavailable,
            LecternError::Backend { .. } => ErrorCode::Backend,
            LecternError::Cancelled { .. } => ErrorCode::Cancelled,
            LecternError::Timeout { .. } => ErrorCode::Timeout,
            _ => ErrorCode::Internal,
        };
        Self {
            error: err.to_string(),
            code: Some(code),
        }
    }

    /// Wire form of the payload. Built by hand so reporting a failure can
    /// never fail itself.
    pub fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("error".into(), Value::String(self.error));
        if let Some(code) = self.code {
            payload.insert("code".into(), Value::String(code.as_str().to_string()));
        }
        payload
    }

    /// Reconstruct the runtime error a wire error payload stands for
    pub fn into_error(self) -> LecternError {
        match self.code {
            Some(ErrorCode::CapabilityUnavailable) => {
                LecternError::capability_unavailable(self.error)
            }
            Some(ErrorCode::Backend) => LecternError::backend(self.error),
            Some(ErrorCode::Cancelled) => LecternError::cancelled(self.error),
            Some(ErrorCode::Timeout) => LecternError::timeout(self.error),
            _ => LecternError::internal(self.error),
        }
    }
}

/// `seek-media` arguments
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeekArgs {
    /// Target position in seconds
    pub seconds: f64,
}

/// `set-media-volume` arguments
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeArgs {
    /// Normalized volume, 0..1
    pub volume: f64,
}

/// `play-media` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StartedPayload {
    /// Whether playback actually started
    pub started: bool,
}

/// `get-media-current-time` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentTimePayload {
    /// Position in seconds
    pub current_time: f64,
}

/// `get-media-duration` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DurationPayload {
    /// Duration in seconds
    pub duration: f64,
}

/// `is-media-playing` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayingPayload {
    /// Whether the backend is currently playing
    pub playing: bool,
}

/// `update-state` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateUpdateArgs {
    /// State key
    pub key: String,
    /// Value to store
    pub value: Value,
}

/// `get-state` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateQueryArgs {
    /// State key
    pub key: String,
}

/// `get-state` response; `value` is null when the key was never written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateValuePayload {
    /// Stored value, if any
    pub value: Option<Value>,
}

/// `subscribe` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeArgs {
    /// Topic to stream; matches the `event` field of `emit-event` frames
    pub event: String,
}

/// `subscribe` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionGrant {
    /// Identifier tagging every pushed delivery for this stream
    pub subscription_id: SubscriptionId,
}

/// `unsubscribe` arguments
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeArgs {
    /// Stream to close
    pub subscription_id: SubscriptionId,
}

/// `emit-event` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitEventArgs {
    /// Topic name
    pub event: String,
    /// Event body, forwarded verbatim to subscribers
    #[serde(default)]
    pub data: Value,
}

/// `post-to-chat` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageArgs {
    /// Message text
    pub message: String,
}

/// `show-snack` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnackArgs {
    /// Notification text
    pub text: String,
}

/// `show-overlay-html` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayArgs {
    /// Markup rendered by the embedding UI
    pub html: String,
}

/// `save-instance-data` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDataArgs {
    /// Opaque interaction state blob
    pub data: Value,
}

/// `get-instance-data-history` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceHistoryPayload {
    /// Prior saves, oldest first
    pub history: Vec<Value>,
}

/// `save-user-progress` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressArgs {
    /// Opaque progress blob
    pub progress: Value,
}

/// `get-user-progress` response; `progress` is null when nothing was saved
/// (distinct from a store failure, which is an error response)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProgressPayload {
    /// Saved progress, if any
    pub progress: Option<Value>,
}

/// `increment-attempts` response
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttemptsPayload {
    /// Attempt count after the increment
    pub attempts: u32,
}

/// `get-user-public-profile` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicProfilePayload {
    /// Profile fields the host chooses to expose
    pub profile: Value,
}
