//! Redis pub/sub transport (optional).
//!
//! Each topic maps to one channel, `{prefix}:{topic.channel()}`, so a
//! connected client subscribes only to what it may see (`role:admin`,
//! `user:{id}`, `room:order:{id}`). Pub/sub is not durable: deliveries to
//! offline subscribers are lost, which is acceptable because durable
//! notifications are persisted by the store.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;
use tracing::{debug, warn};

use shopfloor_events::{Delivery, EventBus, Subscription};

pub const DEFAULT_CHANNEL_PREFIX: &str = "shopfloor";

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis: {0}")]
    Redis(String),
    #[error("serialize: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone)]
pub struct RedisPubSubTransport {
    client: redis::Client,
    prefix: String,
}

impl RedisPubSubTransport {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, RedisBusError> {
        Self::with_prefix(redis_url, DEFAULT_CHANNEL_PREFIX)
    }

    pub fn with_prefix(
        redis_url: impl AsRef<str>,
        prefix: impl Into<String>,
    ) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    pub fn channel_for(&self, delivery: &Delivery) -> String {
        format!("{}:{}", self.prefix, delivery.topic.channel())
    }
}

impl EventBus<Delivery> for RedisPubSubTransport {
    type Error = RedisBusError;

    fn publish(&self, message: Delivery) -> Result<(), Self::Error> {
        let channel = self.channel_for(&message);
        let payload =
            serde_json::to_string(&message).map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        let receivers: i64 = conn
            .publish(&channel, payload)
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;
        debug!(channel, receivers, "delivery published");

        Ok(())
    }

    /// Pattern-subscribes to every channel under the prefix.
    fn subscribe(&self) -> Subscription<Delivery> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let pattern = format!("{}:*", self.prefix);

        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(err) => {
                    warn!(error = %err, "redis subscriber could not connect");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(err) = pubsub.psubscribe(&pattern) {
                warn!(error = %err, pattern, "redis psubscribe failed");
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(err) => {
                        warn!(error = %err, "redis subscription closed");
                        return;
                    }
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let delivery: Delivery = match serde_json::from_str(&payload) {
                    Ok(d) => d,
                    Err(err) => {
                        debug!(error = %err, "skipping undecodable delivery");
                        continue;
                    }
                };

                if tx.send(delivery).is_err() {
                    return;
                }
            }
        });

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::Serialize;
    use shopfloor_core::{AggregateId, UserId};
    use shopfloor_events::{Event, EventEnvelope, Topic};

    #[derive(Debug, Clone, Serialize)]
    struct Pinged {
        at: DateTime<Utc>,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }

        fn entity_key(&self) -> String {
            "p".into()
        }
    }

    #[test]
    fn channels_carry_prefix_and_topic() {
        let transport = RedisPubSubTransport::with_prefix("redis://127.0.0.1/", "plant-a").unwrap();
        let user = UserId::new();
        let envelope = EventEnvelope::wrap(AggregateId::new(), "test", 1, Pinged { at: Utc::now() })
            .to_json()
            .unwrap();
        let delivery = Delivery {
            topic: Topic::user(user),
            envelope,
        };

        assert_eq!(transport.channel_for(&delivery), format!("plant-a:user:{user}"));
    }
}
