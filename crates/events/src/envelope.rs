use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopfloor_core::AggregateId;

use crate::Event;

/// Envelope for a committed event, carrying stream metadata.
///
/// Notes:
/// - `event_id` is **stable**: `{entity_key}-{event_type}`. Re-publishing the
///   same fact yields the same id, so consumers can drop duplicates even
///   though fan-out does not deduplicate.
/// - `sequence_number` is the aggregate version right after the event was
///   applied, monotonically increasing per aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: String,
    event_type: String,

    aggregate_id: AggregateId,
    aggregate_type: String,

    sequence_number: u64,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed domain event, deriving the stable id from the event itself.
    pub fn wrap(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event: E,
    ) -> Self {
        Self {
            event_id: stable_event_id(&event.entity_key(), event.event_type()),
            event_type: event.event_type().to_string(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            occurred_at: event.occurred_at(),
            payload: event,
        }
    }
}

impl<E: Serialize> EventEnvelope<E> {
    /// Erase the payload type for transport.
    pub fn to_json(&self) -> Result<EventEnvelope<JsonValue>, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: self.event_id.clone(),
            event_type: self.event_type.clone(),
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type.clone(),
            sequence_number: self.sequence_number,
            occurred_at: self.occurred_at,
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}

/// `{entity}-{event_type}`.
pub fn stable_event_id(entity_key: &str, event_type: &str) -> String {
    format!("{entity_key}-{event_type}")
}
