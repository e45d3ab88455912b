//! Domain event contract and delivery mechanics.
//!
//! Domain crates implement [`Event`]; infra wraps committed events in
//! [`EventEnvelope`]s and publishes [`Delivery`] messages on an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod topic;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, stable_event_id};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use topic::{Delivery, Topic};
