//! Infrastructure transports for [`Delivery`](shopfloor_events::Delivery)
//! messages.
//!
//! The bus abstraction and the in-memory transport live in
//! `shopfloor-events`; this module adds network-backed transports.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubTransport};
