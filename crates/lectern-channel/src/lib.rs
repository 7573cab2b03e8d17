//! Message-port transport and correlation protocol for lesson hosting.
//!
//! This crate provides the bidirectional messaging layer between a trusted
//! lesson host and the untrusted content frames it embeds. Frames are
//! exchanged as JSON text over a [`MessagePort`], which offers no delivery
//! guarantees beyond in-order transmission while both ends are alive. On top
//! of that, [`CorrelationChannel`] implements request/response pairing via
//! correlation ids, fire-and-forget events, and durable topic subscriptions.
//!
//! Both ends of a conversation use the same channel type. The host
//! additionally pushes subscription deliveries with
//! [`CorrelationChannel::push_to_subscribers`].

#![forbid(unsafe_code)]

pub mod channel;
pub mod port;

pub use channel::{CorrelationChannel, Subscription};
pub use port::{InProcessPort, MessageBus, MessagePort};
