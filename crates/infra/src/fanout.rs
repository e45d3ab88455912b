//! Notification and event fan-out.
//!
//! Given a committed event, resolve who hears about it (roles, individual
//! users, rooms) and deliver one [`Delivery`] per topic on the bus. Audit-worthy
//! events are also turned into per-user [`Notification`] rows that the engine
//! writes in the same commit as the state change; everything else is
//! best-effort.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use shopfloor_auth::{Role, UserDirectory};
use shopfloor_core::UserId;
use shopfloor_events::{Delivery, EventBus, EventEnvelope, Topic};
use shopfloor_inventory::LowStockDetected;
use shopfloor_production::{ProductionOrder, ProductionOrderEvent, ProductionOrderId};

/// Event types persisted as notifications.
pub const DURABLE_EVENT_TYPES: [&str; 4] = [
    "production.order.created",
    "production.order.completed",
    "production.order.confirmed",
    "production.order.cancelled",
];

pub fn is_durable(event_type: &str) -> bool {
    DURABLE_EVENT_TYPES.contains(&event_type)
}

/// Persisted, per-recipient notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: UserId,
    /// Stable event id; `(recipient_id, event_id)` is unique.
    pub event_id: String,
    pub event_type: String,
    pub title: String,
    pub message: String,
    pub order_id: Option<ProductionOrderId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Recipient rules for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub roles: Vec<Role>,
    pub users: Vec<UserId>,
    pub rooms: Vec<Topic>,
}

impl Recipients {
    fn managers() -> Self {
        Self {
            roles: vec![Role::ADMIN, Role::PRODUCTION_MANAGER],
            ..Self::default()
        }
    }

    fn with_user(mut self, user: Option<UserId>) -> Self {
        if let Some(user) = user {
            if !self.users.contains(&user) {
                self.users.push(user);
            }
        }
        self
    }

    fn with_room(mut self, room: Topic) -> Self {
        if !self.rooms.contains(&room) {
            self.rooms.push(room);
        }
        self
    }

    /// Every topic a delivery goes to, without repeats.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = Vec::new();
        let all = self
            .roles
            .iter()
            .map(|r| Topic::role(r.as_str()))
            .chain(self.users.iter().map(|u| Topic::user(*u)))
            .chain(self.rooms.iter().cloned());
        for topic in all {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        topics
    }

    /// Individual users behind the rules (roles expanded via the directory).
    pub async fn resolve_users<D>(&self, directory: &D) -> Result<Vec<UserId>, shopfloor_auth::DirectoryError>
    where
        D: UserDirectory + ?Sized,
    {
        let mut users = self.users.clone();
        for role in &self.roles {
            users.extend(directory.list_users_by_role(role).await?);
        }
        users.sort();
        users.dedup();
        Ok(users)
    }
}

/// Who hears about an order event. `order` is the state after the commit.
pub fn order_recipients(event: &ProductionOrderEvent, order: &ProductionOrder) -> Recipients {
    let room = Topic::order_room(order.id_typed());
    match event {
        ProductionOrderEvent::WorkerAssigned(e) => Recipients::default()
            .with_user(Some(e.worker_id))
            .with_room(room),
        ProductionOrderEvent::OrderApproved(_) | ProductionOrderEvent::OrderStatusChanged(_) => {
            Recipients::managers()
                .with_user(order.created_by())
                .with_room(room)
        }
        ProductionOrderEvent::OrderCancelled(_) => {
            let mut recipients = Recipients::managers().with_user(order.created_by());
            for worker in order.items().iter().filter_map(|i| i.assigned_to) {
                recipients = recipients.with_user(Some(worker));
            }
            recipients.with_room(room)
        }
        ProductionOrderEvent::OrderCreated(_)
        | ProductionOrderEvent::ItemStatusChanged(_)
        | ProductionOrderEvent::ProductionConfirmed(_) => Recipients::managers().with_room(room),
    }
}

pub fn low_stock_recipients(signal: &LowStockDetected) -> Recipients {
    let recipients = Recipients::managers();
    match signal.department_id {
        Some(department) => recipients.with_room(Topic::department_room(department)),
        None => recipients,
    }
}

fn describe(event: &ProductionOrderEvent) -> (String, String) {
    match event {
        ProductionOrderEvent::OrderCreated(e) => (
            "Production order created".to_string(),
            format!("Order {} was created with {} item(s)", e.order_number, e.items.len()),
        ),
        ProductionOrderEvent::OrderStatusChanged(e) => (
            format!("Production order {}", e.to),
            format!("Order {} moved from {} to {}", e.order_number, e.from, e.to),
        ),
        ProductionOrderEvent::ProductionConfirmed(e) => (
            "Production confirmed".to_string(),
            format!(
                "Order {} credited {} product line(s) to inventory",
                e.order_number,
                e.credits.len()
            ),
        ),
        ProductionOrderEvent::OrderCancelled(e) => (
            "Production order cancelled".to_string(),
            match &e.reason {
                Some(reason) => format!("Order {} was cancelled: {reason}", e.order_number),
                None => format!("Order {} was cancelled", e.order_number),
            },
        ),
        ProductionOrderEvent::OrderApproved(e) => (
            "Production order approved".to_string(),
            format!("Order {} was approved", e.order_number),
        ),
        ProductionOrderEvent::WorkerAssigned(e) => (
            "New production task".to_string(),
            format!("Item {} of order {} is assigned to you", e.item_id, e.order_number),
        ),
        ProductionOrderEvent::ItemStatusChanged(e) => (
            "Item progress".to_string(),
            format!("Item {} of order {} is now {}", e.item_id, e.order_number, e.to),
        ),
    }
}

/// Notification rows for one envelope, one per recipient.
pub fn notifications_for(
    envelope: &EventEnvelope<ProductionOrderEvent>,
    recipients: &[UserId],
) -> Vec<Notification> {
    if !is_durable(envelope.event_type()) {
        return Vec::new();
    }
    let (title, message) = describe(envelope.payload());
    recipients
        .iter()
        .map(|recipient| Notification {
            id: Uuid::now_v7(),
            recipient_id: *recipient,
            event_id: envelope.event_id().to_string(),
            event_type: envelope.event_type().to_string(),
            title: title.clone(),
            message: message.clone(),
            order_id: Some(envelope.payload().order_id()),
            read: false,
            created_at: envelope.occurred_at(),
        })
        .collect()
}

/// Best-effort publisher over an [`EventBus`] of [`Delivery`] messages.
#[derive(Debug)]
pub struct NotificationFanout<B> {
    bus: Arc<B>,
}

impl<B> Clone for NotificationFanout<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<B> NotificationFanout<B>
where
    B: EventBus<Delivery>,
{
    pub fn new(bus: Arc<B>) -> Self {
        Self { bus }
    }

    /// Publish one envelope to every topic. Returns the number of successful
    /// deliveries; failures are logged and never propagated.
    pub fn publish(&self, envelope: &EventEnvelope<JsonValue>, recipients: &Recipients) -> usize {
        let mut delivered = 0;
        for topic in recipients.topics() {
            let delivery = Delivery {
                topic: topic.clone(),
                envelope: envelope.clone(),
            };
            match self.bus.publish(delivery) {
                Ok(()) => delivered += 1,
                Err(err) => warn!(
                    event_id = envelope.event_id(),
                    topic = %topic,
                    error = ?err,
                    "event delivery failed"
                ),
            }
        }
        debug!(event_id = envelope.event_id(), delivered, "event fanned out");
        delivered
    }

    /// Serialize and publish a typed envelope.
    pub fn publish_typed<E>(&self, envelope: &EventEnvelope<E>, recipients: &Recipients) -> usize
    where
        E: Serialize,
    {
        match envelope.to_json() {
            Ok(json) => self.publish(&json, recipients),
            Err(err) => {
                warn!(event_id = envelope.event_id(), error = %err, "event payload not serializable");
                0
            }
        }
    }
}
