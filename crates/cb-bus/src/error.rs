use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Event bus configuration error: {0}")]
    Config(String),

    #[error("Adapter is not open; call open/subscribe first")]
    NotOpen,

    #[error("Event encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Broker rejected the message: {0}")]
    Rejected(String),

    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[cfg(feature = "amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

impl BusError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
