//! Inventory domain module (event-sourced).
//!
//! Materials are the tracked stock items of an atelier. Business rules live
//! here as deterministic domain logic (no IO, no HTTP, no storage).

pub mod material;

pub use material::{
    AGGREGATE_TYPE, ConsumeForOrder, ConsumedForOrder, CreateMaterial, Material, MaterialCommand,
    MaterialCreated, MaterialEvent, MaterialId, MovementKind, RecordMovement, StockMoved,
};
