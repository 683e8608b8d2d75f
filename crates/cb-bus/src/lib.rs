//! CellBase Event Bus
//!
//! Broker-agnostic event transport. Four independent capabilities:
//! - `EventSender`: point-to-point send of validated events to a queue/topic
//! - `EventPublisher`: fan-out publish of raw data keyed by a scope URL
//! - `EventReceiver`: competing consumer of a queue/topic
//! - `EventSubscriber`: broadcast subscriber of a topic
//!
//! Adapters are chosen once at startup by [`EventBus::from_config`]. An
//! unconfigured bus hands out no adapters and is not an error.
//!
//! ## Features
//!
//! - `kafka`: Kafka adapter (rdkafka)
//! - `amqp`: AMQP 0-9-1 adapter (lapin)

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod codec;
pub mod error;
pub mod factory;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod traits;

pub use error::BusError;
pub use factory::EventBus;
pub use memory::InMemoryBroker;
pub use traits::{EventPublisher, EventReceiver, EventSender, EventSubscriber};

pub type Result<T> = std::result::Result<T, BusError>;
