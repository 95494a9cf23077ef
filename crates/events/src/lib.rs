//! Stock notifications: event contract, envelope and pub/sub bus.
//!
//! The ledger is the source of truth. Events published here are post-commit
//! notifications for alerting and read-side consumers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
