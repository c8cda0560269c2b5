//! Domain building blocks shared by every atelier module.
//!
//! Pure domain primitives only: identifiers, the aggregate contract and the
//! domain error model. No IO lives here.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId};
