//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and maintain tenant-isolated,
//! disposable read models. They are idempotent under at-least-once delivery
//! and can be rebuilt from the event store.

pub mod material_stock;

pub use material_stock::{MaterialProjectionError, MaterialStockProjection, MaterialStockReadModel};
