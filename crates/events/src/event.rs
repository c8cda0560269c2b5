use chrono::{DateTime, Utc};

/// Implemented by every domain event enum so the store can label payloads.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name stored next to the payload, e.g. `"sales.order.status_changed"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema revision; bump when the serialized shape changes.
    fn version(&self) -> u32;

    /// Business time at which the fact happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
