use std::collections::HashMap;
use std::sync::RwLock;

use atelie_core::{AggregateId, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single write lock covers a whole batch, which is
/// what makes multi-stream appends atomic here.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append_streams(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }

        let targets = validate_batch(&batch)?;

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        // Check every stream before writing anything.
        for (part, target) in batch.iter().zip(&targets) {
            let key = StreamKey {
                tenant_id: target.tenant_id,
                aggregate_id: target.aggregate_id,
            };
            let stream = streams.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(stream);

            if !part.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {}, found version {current}",
                    target.aggregate_id, part.expected_version
                )));
            }

            if let Some(existing) = stream.first() {
                if existing.aggregate_type != target.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, target.aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for (part, target) in batch.into_iter().zip(targets) {
            let key = StreamKey {
                tenant_id: target.tenant_id,
                aggregate_id: target.aggregate_id,
            };
            let stream = streams.entry(key).or_default();
            let mut next = Self::current_version(stream) + 1;

            for e in part.events {
                let stored = StoredEvent {
                    event_id: e.event_id,
                    tenant_id: e.tenant_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    sequence_number: next,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all_of_type(&self, aggregate_type: &str) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))?;

        Ok(streams
            .values()
            .filter(|s| s.first().is_some_and(|e| e.aggregate_type == aggregate_type))
            .flat_map(|s| s.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::UncommittedEvent;
    use atelie_core::ExpectedVersion;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.event".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn append_assigns_sequence_numbers_from_one() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();

        let committed = store
            .append(
                vec![
                    event(tenant_id, aggregate_id, "a"),
                    event(tenant_id, aggregate_id, "a"),
                ],
                ExpectedVersion::NoStream,
            )
            .unwrap();

        let seqs: Vec<u64> = committed.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        store
            .append(vec![event(tenant_id, aggregate_id, "a")], ExpectedVersion::NoStream)
            .unwrap();

        let err = store
            .append(vec![event(tenant_id, aggregate_id, "a")], ExpectedVersion::NoStream)
            .unwrap_err();
        assert!(err.is_concurrency());
    }

    #[test]
    fn multi_stream_append_is_all_or_nothing() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let first = AggregateId::new();
        let second = AggregateId::new();
        store
            .append(vec![event(tenant_id, second, "a")], ExpectedVersion::NoStream)
            .unwrap();

        // Second stream is at version 1, not 0: nothing may be written.
        let err = store
            .append_streams(vec![
                StreamAppend::new(ExpectedVersion::NoStream, vec![event(tenant_id, first, "a")]),
                StreamAppend::new(ExpectedVersion::NoStream, vec![event(tenant_id, second, "a")]),
            ])
            .unwrap_err();

        assert!(err.is_concurrency());
        assert!(store.load_stream(tenant_id, first).unwrap().is_empty());
        assert_eq!(store.load_stream(tenant_id, second).unwrap().len(), 1);
    }

    #[test]
    fn multi_stream_append_commits_every_stream() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let first = AggregateId::new();
        let second = AggregateId::new();

        let committed = store
            .append_streams(vec![
                StreamAppend::new(ExpectedVersion::NoStream, vec![event(tenant_id, first, "a")]),
                StreamAppend::new(ExpectedVersion::NoStream, vec![event(tenant_id, second, "b")]),
            ])
            .unwrap();

        assert_eq!(committed.len(), 2);
        assert_eq!(store.load_stream(tenant_id, first).unwrap().len(), 1);
        assert_eq!(store.load_stream(tenant_id, second).unwrap().len(), 1);
    }

    #[test]
    fn batch_spanning_tenants_is_rejected() {
        let store = InMemoryEventStore::new();
        let err = store
            .append_streams(vec![
                StreamAppend::new(
                    ExpectedVersion::Any,
                    vec![event(TenantId::new(), AggregateId::new(), "a")],
                ),
                StreamAppend::new(
                    ExpectedVersion::Any,
                    vec![event(TenantId::new(), AggregateId::new(), "a")],
                ),
            ])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }

    #[test]
    fn streams_are_invisible_to_other_tenants() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        store
            .append(vec![event(tenant_id, aggregate_id, "a")], ExpectedVersion::Any)
            .unwrap();

        assert!(store.load_stream(TenantId::new(), aggregate_id).unwrap().is_empty());
    }

    #[test]
    fn load_all_of_type_filters_by_aggregate_type() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        store
            .append(vec![event(tenant_id, AggregateId::new(), "a")], ExpectedVersion::Any)
            .unwrap();
        store
            .append(vec![event(tenant_id, AggregateId::new(), "b")], ExpectedVersion::Any)
            .unwrap();

        let all_a = store.load_all_of_type("a").unwrap();
        assert_eq!(all_a.len(), 1);
        assert_eq!(all_a[0].aggregate_type, "a");
    }
}
