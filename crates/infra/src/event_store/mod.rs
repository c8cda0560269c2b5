//! Append-only event store boundary.
//!
//! Tenant-scoped event streams behind the [`EventStore`] trait, with an
//! in-memory backend for tests and single-process runs and a Postgres backend
//! for persistence. Both commit multi-stream batches atomically.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
