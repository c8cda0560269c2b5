//! Orders domain module (event-sourced).
//!
//! This crate contains business rules for customer orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Stock checks around
//! the move into production live in `atelie-fulfillment`.

pub mod order;

pub use order::{
    AGGREGATE_TYPE, AddItem, ChangeStatus, CreateOrder, ItemAdded, Order, OrderCommand,
    OrderCreated, OrderEvent, OrderId, OrderItem, OrderStatus, StatusChanged,
};
