//! Identifier newtypes used across the Lectern runtime
//!
//! Each identifier wraps a v4 UUID. Correlation ids must be fresh and
//! process-unique for every request envelope; the remaining ids follow the
//! same shape for consistency.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Token pairing a request envelope with its eventual response
    CorrelationId,
    "corr"
);

uuid_id!(
    /// Identifier for a durable host-broadcast subscription
    SubscriptionId,
    "sub"
);

uuid_id!(
    /// Identifier for one live playback session
    PlaybackSessionId,
    "playback"
);

uuid_id!(
    /// Identifier for a lesson segment
    SegmentId,
    "segment"
);
