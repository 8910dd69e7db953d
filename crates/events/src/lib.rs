//! Change notifications: event contract, envelopes and pub/sub mechanics.
//!
//! The ledger itself is synchronous request/response. Callers that need live
//! updates subscribe to a bus that carries an envelope per committed mutation.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
