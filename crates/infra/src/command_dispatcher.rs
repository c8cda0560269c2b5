//! Single-stream command execution: load the stream, fold it into the
//! aggregate, let the aggregate decide, append expecting the version that was
//! read, then publish what was committed.
//!
//! [`load_aggregate`] and [`to_uncommitted`] are exposed separately for
//! services that read several streams and commit them in one multi-stream
//! append (see `fulfillment`).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use atelie_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use atelie_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Cross-tenant or cross-aggregate stream mixing.
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Historical payloads do not match the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound(entity) => DispatchError::NotFound(entity),
            e @ DomainError::InvalidId { .. } => DispatchError::Validation(e.to_string()),
        }
    }
}

/// Aggregate rehydrated from its stream, with the stream version it was read at.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    pub version: u64,
}

impl<A> Loaded<A> {
    /// Version to expect when appending events decided on this state.
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::for_stream(self.version)
    }
}

/// Load and rehydrate one aggregate.
///
/// A stream that does not exist yields `make_aggregate`'s empty instance at version 0.
pub fn load_aggregate<S, A>(
    store: &S,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
) -> Result<Loaded<A>, DispatchError>
where
    S: EventStore + ?Sized,
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(tenant_id, aggregate_id)?;
    let version = check_stream(tenant_id, aggregate_id, &history)?;

    let mut aggregate = make_aggregate(tenant_id, aggregate_id);
    apply_history::<A>(&mut aggregate, &history)?;

    Ok(Loaded { aggregate, version })
}

/// Wrap decided domain events for one stream.
pub fn to_uncommitted<E>(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    events: &[E],
) -> Result<Vec<UncommittedEvent>, EventStoreError>
where
    E: atelie_events::Event + Serialize,
{
    events
        .iter()
        .map(|ev| UncommittedEvent::from_typed(tenant_id, aggregate_id, aggregate_type, Uuid::now_v7(), ev))
        .collect()
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if the append fails nothing is
/// published. If publication fails after a successful append the error is
/// returned; the events stay committed (at-least-once delivery).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load, rehydrate, decide, append with `Exact(version)`, then publish
    /// (best effort).
    ///
    /// A concurrent append to the same stream surfaces as
    /// `DispatchError::Concurrency`; callers may reload and retry.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: atelie_events::Event + Serialize + DeserializeOwned,
    {
        let loaded = load_aggregate(&self.store, tenant_id, aggregate_id, make_aggregate)?;

        let decided = loaded.aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = to_uncommitted(tenant_id, aggregate_id, aggregate_type, &decided)?;
        let committed = self.store.append(uncommitted, loaded.expected_version())?;

        self.publish_committed(&committed);
        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command (queries).
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Loaded<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        load_aggregate(&self.store, tenant_id, aggregate_id, make_aggregate)
    }

    /// Publish events that are already durable.
    ///
    /// The append has succeeded at this point, so a bus failure is logged and
    /// swallowed; consumers catch up by rebuilding their read models.
    pub fn publish_committed(&self, committed: &[StoredEvent]) {
        if let Err(err) = self.publish(committed) {
            warn!(error = %err, events = committed.len(), "committed events were not published");
        }
    }

    /// Publish already committed events, in order.
    pub fn publish(&self, committed: &[StoredEvent]) -> Result<(), DispatchError> {
        for stored in committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        Ok(())
    }
}

/// Guard against a backend handing back foreign or out-of-order rows.
/// Returns the stream version (last sequence number, 0 when empty).
fn check_stream(tenant_id: TenantId, aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<u64, DispatchError> {
    stream.iter().try_fold(0u64, |last, e| {
        if e.tenant_id != tenant_id || e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "stream {tenant_id}/{aggregate_id} returned event {} of {}/{}",
                e.event_id, e.tenant_id, e.aggregate_id
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::Storage(format!(
                "stream {aggregate_id} jumps from {last} to {}",
                e.sequence_number
            ))));
        }
        Ok(e.sequence_number)
    })
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let events = history
        .iter()
        .map(|stored| {
            serde_json::from_value::<A::Event>(stored.payload.clone()).map_err(|e| {
                DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    aggregate.replay(&events);
    Ok(())
}
