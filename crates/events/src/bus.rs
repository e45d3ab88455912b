//! Transport for [`Delivery`] messages.
//!
//! After a unit of work commits, the fan-out in infra resolves who should
//! hear about each event (roles, individual users, order and department
//! rooms) and publishes one [`Delivery`] per topic. A bus carries those
//! deliveries to live connections: admin consoles, manager dashboards and
//! worker task lists.
//!
//! The same event may reach a connection twice, either through two topics
//! it has joined or through a transport redelivery. Consumers key on
//! `envelope.event_id()`, which is stable per event.
//!
//! Nothing here is durable. Stored notifications are the record of what a
//! recipient was told; a publish failure is logged by the caller and the
//! committed operation stands.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use crate::topic::{Delivery, Topic};

/// One connection's view of the bus.
///
/// Every published message is copied to every subscription; a connection
/// that only joined some topics filters with [`Subscription::drain_for`].
#[derive(Debug)]
pub struct Subscription<M = Delivery> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything buffered so far.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

impl Subscription<Delivery> {
    /// Buffered deliveries addressed to one of `joined`. Deliveries for
    /// other topics are consumed and dropped.
    pub fn drain_for(&self, joined: &[Topic]) -> Vec<Delivery> {
        self.receiver
            .try_iter()
            .filter(|d| joined.contains(&d.topic))
            .collect()
    }
}

/// Publishes deliveries to whoever is listening.
///
/// Shared between request handlers, so implementations are `Send + Sync`.
pub trait EventBus<M = Delivery>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventEnvelope;
    use chrono::Utc;
    use serde_json::json;
    use shopfloor_core::{AggregateId, UserId};
    use std::sync::mpsc;

    fn delivery(topic: Topic) -> Delivery {
        Delivery {
            topic,
            envelope: EventEnvelope::new(
                "ord-1-production.order.created",
                "production.order.created",
                AggregateId::new(),
                "production_order",
                1,
                Utc::now(),
                json!({ "order_number": "ORD-1" }),
            ),
        }
    }

    #[test]
    fn drain_for_keeps_joined_topics_only() {
        let (tx, rx) = mpsc::channel();
        let sub = Subscription::new(rx);
        let worker = UserId::new();

        tx.send(delivery(Topic::role("admin"))).unwrap();
        tx.send(delivery(Topic::user(worker))).unwrap();
        tx.send(delivery(Topic::order_room("ord-1"))).unwrap();

        let seen = sub.drain_for(&[Topic::user(worker), Topic::order_room("ord-1")]);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].topic, Topic::user(worker));
        assert!(sub.drain().is_empty());
    }
}
