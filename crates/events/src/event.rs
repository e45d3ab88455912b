use chrono::{DateTime, Utc};

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "production.order.created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Entity the event is about, used to build the stable event id.
    ///
    /// Events that can happen more than once to the same entity (status
    /// changes) must fold the distinguishing part (the target status) into
    /// the key so that `{entity_key}-{event_type}` stays unique per fact.
    fn entity_key(&self) -> String;
}
