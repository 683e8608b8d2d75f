use cb_config::EventBusConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::memory::InMemoryBroker;
use crate::traits::{EventPublisher, EventReceiver, EventSender, EventSubscriber};
use crate::{BusError, Result};

#[cfg(feature = "amqp")]
use crate::amqp::{self, AmqpSettings};
#[cfg(feature = "kafka")]
use crate::kafka::{self, KafkaSettings};

/// Broker family selected once at startup
pub enum EventBus {
    /// Queue-style broker
    #[cfg(feature = "kafka")]
    Kafka(KafkaSettings),
    /// Topic-exchange pub/sub broker
    #[cfg(feature = "amqp")]
    Amqp(AmqpSettings),
    /// In-process broker shared by every adapter created from this bus
    Embedded(InMemoryBroker),
    /// No broker settings; every `create_*` yields `None`
    Unconfigured,
}

impl EventBus {
    /// Missing kind or address is a valid "bus off" state. A kind that is
    /// unknown, or whose adapter was not compiled in, is a configuration error.
    pub fn from_config(config: &EventBusConfig) -> Result<Self> {
        if !config.is_configured() {
            info!("Event bus not configured, events will not be published");
            return Ok(EventBus::Unconfigured);
        }
        let kind = config.mq.as_deref().unwrap_or_default().trim().to_ascii_lowercase();

        let bus = match kind.as_str() {
            "memory" => EventBus::Embedded(InMemoryBroker::new(
                Duration::from_millis(config.poll_timeout_ms),
                config.max_batch_size,
            )),
            #[cfg(feature = "kafka")]
            "kafka" => EventBus::Kafka(KafkaSettings::from_config(config)),
            #[cfg(feature = "amqp")]
            "amqp" | "rabbitmq" => EventBus::Amqp(AmqpSettings::from_config(config)),
            #[cfg(not(feature = "kafka"))]
            "kafka" => {
                return Err(BusError::config(
                    "event bus 'kafka' requires the 'kafka' feature",
                ))
            }
            #[cfg(not(feature = "amqp"))]
            "amqp" | "rabbitmq" => {
                return Err(BusError::config(format!(
                    "event bus '{}' requires the 'amqp' feature",
                    kind
                )))
            }
            other => return Err(BusError::config(format!("unknown event bus kind: {}", other))),
        };
        info!(kind = %kind, "Event bus configured");
        Ok(bus)
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, EventBus::Unconfigured)
    }

    pub fn create_sender(&self) -> Option<Arc<dyn EventSender>> {
        match self {
            #[cfg(feature = "kafka")]
            EventBus::Kafka(settings) => Some(Arc::new(kafka::KafkaSender::new(settings.clone()))),
            #[cfg(feature = "amqp")]
            EventBus::Amqp(settings) => Some(Arc::new(amqp::AmqpSender::new(settings.clone()))),
            EventBus::Embedded(broker) => Some(Arc::new(broker.producer())),
            EventBus::Unconfigured => None,
        }
    }

    pub fn create_publisher(&self) -> Option<Arc<dyn EventPublisher>> {
        match self {
            #[cfg(feature = "kafka")]
            EventBus::Kafka(settings) => {
                Some(Arc::new(kafka::KafkaPublisher::new(settings.clone())))
            }
            #[cfg(feature = "amqp")]
            EventBus::Amqp(settings) => Some(Arc::new(amqp::AmqpPublisher::new(settings.clone()))),
            EventBus::Embedded(broker) => Some(Arc::new(broker.producer())),
            EventBus::Unconfigured => None,
        }
    }

    pub fn create_receiver(&self) -> Option<Arc<dyn EventReceiver>> {
        match self {
            #[cfg(feature = "kafka")]
            EventBus::Kafka(settings) => {
                Some(Arc::new(kafka::KafkaConsumer::receiver(settings.clone())))
            }
            #[cfg(feature = "amqp")]
            EventBus::Amqp(settings) => Some(Arc::new(amqp::AmqpReceiver::new(settings.clone()))),
            EventBus::Embedded(broker) => Some(Arc::new(broker.consumer())),
            EventBus::Unconfigured => None,
        }
    }

    pub fn create_subscriber(&self) -> Option<Arc<dyn EventSubscriber>> {
        match self {
            #[cfg(feature = "kafka")]
            EventBus::Kafka(settings) => {
                Some(Arc::new(kafka::KafkaConsumer::subscriber(settings.clone())))
            }
            #[cfg(feature = "amqp")]
            EventBus::Amqp(settings) => Some(Arc::new(amqp::AmqpSubscriber::new(settings.clone()))),
            EventBus::Embedded(broker) => Some(Arc::new(broker.consumer())),
            EventBus::Unconfigured => None,
        }
    }
}
