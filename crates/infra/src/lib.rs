//! Infrastructure layer: event storage, command dispatch, read models,
//! fulfillment orchestration and rate limiting.

pub mod command_dispatcher;
pub mod event_store;
pub mod fulfillment;
pub mod projections;
pub mod rate_limit;
pub mod read_model;
