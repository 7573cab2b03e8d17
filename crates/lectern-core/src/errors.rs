//! Unified error system for Lectern
//!
//! One error type covers the whole runtime. Transport and protocol layers
//! classify failures here and callers branch on the variant; nothing in the
//! core ever panics across a component boundary.

use serde::{Deserialize, Serialize};

/// Unified error type for all Lectern operations
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum LecternError {
    /// Malformed or unroutable wire frame. These are logged and dropped at
    /// the channel boundary and never surface into application code.
    #[error("Protocol error: {message}")]
    Protocol {
        /// What was wrong with the frame
        message: String,
    },

    /// No response arrived within the caller's deadline
    #[error("Timed out: {message}")]
    Timeout {
        /// The operation that timed out
        message: String,
    },

    /// The owning session or channel was torn down mid-call
    #[error("Cancelled: {message}")]
    Cancelled {
        /// What was cancelled
        message: String,
    },

    /// Native or embedded playback backend failure
    #[error("Backend error: {message}")]
    Backend {
        /// Provider-reported or classified failure detail
        message: String,
    },

    /// No handler registered for the requested message kind
    #[error("Capability unavailable: {message}")]
    CapabilityUnavailable {
        /// The kind that was probed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Underlying carrier failed to deliver a frame
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// Internal runtime error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl LecternError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a capability-unavailable error
    pub fn capability_unavailable(message: impl Into<String>) -> Self {
        Self::CapabilityUnavailable {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True when the error is a call timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True when the error came from session or channel teardown
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// True when the peer lacks a handler for the requested kind
    pub fn is_capability_unavailable(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable { .. })
    }

    /// True when a playback backend reported the failure
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}

/// Standard Result type for Lectern operations
pub type Result<T> = std::result::Result<T, LecternError>;

impl From<serde_json::Error> for LecternError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
