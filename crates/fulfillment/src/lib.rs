//! Order fulfillment planning.
//!
//! Pure functions that turn an order's items into per-material requirements
//! (via each product's bill of materials) and compare them with on-hand stock.
//! Loading aggregates and committing the resulting deduction is done by
//! `atelie-infra::fulfillment`.

pub mod availability;
pub mod error;
pub mod requirements;

pub use availability::{AvailabilityReport, Shortfall, StockLevel, check_availability};
pub use error::PlanningError;
pub use requirements::MaterialRequirements;
