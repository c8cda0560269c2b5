//! Event mechanics shared by the atelier domain modules.
//!
//! Domain crates implement [`Event`] for their event enums; infrastructure
//! wraps stored events in [`EventEnvelope`]s and fans them out over an
//! [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, EventMeta};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
