use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelie_core::{AggregateId, TenantId};

/// Where a committed event lives and what it is, without its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    /// 1-based position in the aggregate stream.
    pub sequence_number: u64,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
}

impl EventMeta {
    /// True when both metas address the same tenant-scoped stream.
    pub fn same_stream(&self, other: &EventMeta) -> bool {
        self.tenant_id == other.tenant_id && self.aggregate_id == other.aggregate_id
    }
}

/// A committed event as it travels over the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    #[serde(flatten)]
    meta: EventMeta,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(meta: EventMeta, payload: E) -> Self {
        Self { meta, payload }
    }

    pub fn meta(&self) -> &EventMeta {
        &self.meta
    }

    pub fn event_id(&self) -> Uuid {
        self.meta.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.meta.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.meta.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.meta.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.meta.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.meta.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.meta.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Replace the payload, keeping the metadata (e.g. decode JSON into a typed event).
    pub fn try_map<F, T, Err>(self, f: F) -> Result<EventEnvelope<T>, Err>
    where
        F: FnOnce(E) -> Result<T, Err>,
    {
        let payload = f(self.payload)?;
        Ok(EventEnvelope {
            meta: self.meta,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(seq: u64) -> EventMeta {
        EventMeta {
            event_id: Uuid::now_v7(),
            tenant_id: TenantId::new(),
            aggregate_id: AggregateId::new(),
            aggregate_type: "inventory.material".to_string(),
            sequence_number: seq,
            event_type: "inventory.material.stock_moved".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn try_map_keeps_stream_position() {
        let env = EventEnvelope::new(meta(4), "12.5");
        let parsed = env.clone().try_map(|raw| raw.parse::<f64>()).unwrap();

        assert_eq!(parsed.meta(), env.meta());
        assert_eq!(*parsed.payload(), 12.5);
    }

    #[test]
    fn same_stream_ignores_position() {
        let a = meta(1);
        let mut b = a.clone();
        b.sequence_number = 2;
        b.event_id = Uuid::now_v7();

        assert!(a.same_stream(&b));
        assert!(!a.same_stream(&meta(1)));
    }
}
