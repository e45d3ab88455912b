//! Delivery addressing.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopfloor_core::UserId;

use crate::EventEnvelope;

/// Where a delivery is addressed.
///
/// Connections subscribe to the topics they care about: an admin console to
/// `role:admin`, a worker's device to `user:{id}`, an order detail view to
/// `room:order:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum Topic {
    Role(String),
    User(UserId),
    Room(String),
}

impl Topic {
    pub fn role(name: impl Into<String>) -> Self {
        Topic::Role(name.into())
    }

    pub fn user(id: UserId) -> Self {
        Topic::User(id)
    }

    pub fn order_room(order_id: impl core::fmt::Display) -> Self {
        Topic::Room(format!("order:{order_id}"))
    }

    pub fn department_room(department_id: impl core::fmt::Display) -> Self {
        Topic::Room(format!("department:{department_id}"))
    }

    /// Channel name used by string-keyed transports.
    pub fn channel(&self) -> String {
        match self {
            Topic::Role(r) => format!("role:{r}"),
            Topic::User(u) => format!("user:{u}"),
            Topic::Room(r) => format!("room:{r}"),
        }
    }
}

impl core::fmt::Display for Topic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.channel())
    }
}

/// One message on the transport: an event addressed to one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub topic: Topic,
    pub envelope: EventEnvelope<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_prefixed_by_kind() {
        assert_eq!(Topic::role("admin").channel(), "role:admin");
        assert_eq!(Topic::order_room("abc").channel(), "room:order:abc");
        let u = UserId::new();
        assert_eq!(Topic::user(u).to_string(), format!("user:{u}"));
    }
}
