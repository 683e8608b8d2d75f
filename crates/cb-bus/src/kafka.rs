//! Kafka adapter.
//!
//! Producers require acknowledgement from every in-sync replica before a
//! send completes. Consumers commit offsets automatically on a fixed
//! interval, so delivery is at-least-once: a crash between `receive` and
//! processing redelivers the batch.
//!
//! Subscribers join a private group reading from the latest offset, so
//! `subscribe` waits until the group has assigned partitions. Records that
//! arrive while waiting are kept for the first `receive`.

use async_trait::async_trait;
use cb_config::EventBusConfig;
use cb_event::Event;
use futures::FutureExt;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::codec;
use crate::traits::{EventPublisher, EventReceiver, EventSender, EventSubscriber};
use crate::{BusError, Result};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const ASSIGNMENT_TIMEOUT: Duration = Duration::from_secs(30);
const ASSIGNMENT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub group_id: String,
    pub poll_timeout: Duration,
    pub auto_commit_interval_ms: u64,
    pub max_batch_size: usize,
}

impl KafkaSettings {
    pub fn from_config(config: &EventBusConfig) -> Self {
        Self {
            brokers: config.broker.clone().unwrap_or_default(),
            username: config.username.clone(),
            password: config.password.clone(),
            group_id: config.group_id.clone(),
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            auto_commit_interval_ms: config.auto_commit_interval_ms,
            max_batch_size: config.max_batch_size.max(1),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            cfg.set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", user)
                .set("sasl.password", pass);
        }
        cfg
    }

    fn producer_config(&self) -> ClientConfig {
        let mut cfg = self.client_config();
        cfg.set("acks", "all")
            .set("message.timeout.ms", SEND_TIMEOUT.as_millis().to_string());
        cfg
    }

    fn consumer_config(&self, group_id: &str, offset_reset: &str) -> ClientConfig {
        let mut cfg = self.client_config();
        cfg.set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", self.auto_commit_interval_ms.to_string())
            .set("auto.offset.reset", offset_reset)
            .set("allow.auto.create.topics", "true");
        cfg
    }

    fn producer(&self) -> Result<FutureProducer> {
        Ok(self.producer_config().create()?)
    }
}

// ============================================================================
// Producers
// ============================================================================

struct Bound {
    producer: FutureProducer,
    topic: String,
}

/// Shared producer state; open/close replace the bound producer
struct ProducerCore {
    settings: KafkaSettings,
    bound: RwLock<Option<Bound>>,
}

impl ProducerCore {
    fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            bound: RwLock::new(None),
        }
    }

    fn open(&self, topic: &str) -> Result<()> {
        let producer = self.settings.producer()?;
        *self.bound.write() = Some(Bound {
            producer,
            topic: topic.to_string(),
        });
        info!(topic = %topic, brokers = %self.settings.brokers, "Kafka producer opened");
        Ok(())
    }

    fn current(&self) -> Result<(FutureProducer, String)> {
        self.bound
            .read()
            .as_ref()
            .map(|b| (b.producer.clone(), b.topic.clone()))
            .ok_or(BusError::NotOpen)
    }

    async fn send(&self, key: Option<&str>, payload: &str) -> Result<()> {
        let (producer, topic) = self.current()?;
        let mut record = FutureRecord::<str, str>::to(&topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| BusError::Kafka(e))?;
        counter!("cellbase_bus_messages_sent_total", "broker" => "kafka").increment(1);
        Ok(())
    }

    fn close(&self) {
        if let Some(bound) = self.bound.write().take() {
            use rdkafka::producer::Producer;
            if let Err(e) = bound.producer.flush(Timeout::After(SEND_TIMEOUT)) {
                error!(topic = %bound.topic, error = %e, "Kafka producer flush failed on close");
            }
        }
    }
}

pub struct KafkaSender {
    core: ProducerCore,
}

impl KafkaSender {
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            core: ProducerCore::new(settings),
        }
    }
}

#[async_trait]
impl EventSender for KafkaSender {
    async fn open(&self, topic: &str) -> Result<()> {
        self.core.open(topic)
    }

    async fn send(&self, event: &Event) -> Result<()> {
        self.core.send(None, &codec::encode(event)?).await
    }

    async fn close(&self) -> Result<()> {
        self.core.close();
        Ok(())
    }
}

/// Publisher keying records by scope URL so one cell's events stay ordered
pub struct KafkaPublisher {
    core: ProducerCore,
}

impl KafkaPublisher {
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            core: ProducerCore::new(settings),
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn open(&self, topic: &str) -> Result<()> {
        self.core.open(topic)
    }

    async fn publish(&self, scope_url: &str, data: &str) -> Result<()> {
        self.core.send(Some(scope_url), data).await
    }

    async fn close(&self) -> Result<()> {
        self.core.close();
        Ok(())
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Receivers share the configured consumer group; subscribers each get a
/// private group so every subscriber sees every record.
pub struct KafkaConsumer {
    settings: KafkaSettings,
    broadcast: bool,
    consumer: RwLock<Option<Arc<StreamConsumer>>>,
    early: Mutex<Vec<Event>>,
    active: AtomicBool,
    interrupt: Notify,
}

impl KafkaConsumer {
    pub fn receiver(settings: KafkaSettings) -> Self {
        Self::new(settings, false)
    }

    pub fn subscriber(settings: KafkaSettings) -> Self {
        Self::new(settings, true)
    }

    fn new(settings: KafkaSettings, broadcast: bool) -> Self {
        Self {
            settings,
            broadcast,
            consumer: RwLock::new(None),
            early: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
            interrupt: Notify::new(),
        }
    }

    fn group(&self) -> (String, &'static str) {
        if self.broadcast {
            (format!("{}-{}", self.settings.group_id, Uuid::new_v4()), "latest")
        } else {
            (self.settings.group_id.clone(), "earliest")
        }
    }

    async fn attach(&self, topic: &str) -> Result<()> {
        let (group_id, offset_reset) = self.group();
        let consumer: StreamConsumer =
            self.settings.consumer_config(&group_id, offset_reset).create()?;
        consumer.subscribe(&[topic])?;

        let early = if self.broadcast {
            self.await_assignment(&consumer, topic).await
        } else {
            Vec::new()
        };
        *self.early.lock() = early;
        *self.consumer.write() = Some(Arc::new(consumer));
        self.active.store(true, Ordering::SeqCst);
        info!(topic = %topic, group_id = %group_id, "Kafka consumer subscribed");
        Ok(())
    }

    /// Drive the group join until partitions are assigned, so nothing sent
    /// after `subscribe` returns falls before the `latest` offset.
    async fn await_assignment(&self, consumer: &StreamConsumer, topic: &str) -> Vec<Event> {
        let deadline = Instant::now() + ASSIGNMENT_TIMEOUT;
        let mut early = Vec::new();
        loop {
            match consumer.assignment() {
                Ok(assigned) if assigned.count() > 0 => {
                    debug!(
                        topic = %topic,
                        partitions = assigned.count(),
                        "Kafka partitions assigned"
                    );
                    return early;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Kafka assignment lookup failed");
                    return early;
                }
            }
            if Instant::now() >= deadline {
                warn!(topic = %topic, "Kafka partitions not assigned in time, continuing");
                return early;
            }
            // recv serves the rebalance callbacks that complete the join
            match tokio::time::timeout(ASSIGNMENT_POLL, consumer.recv()).await {
                Ok(Ok(message)) => codec::push_decoded(&mut early, message.payload()),
                Ok(Err(e)) => {
                    debug!(topic = %topic, error = %e, "Kafka poll during group join failed")
                }
                Err(_) => {}
            }
        }
    }

    fn detach(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.interrupt.notify_waiters();
        self.early.lock().clear();
        if let Some(consumer) = self.consumer.write().take() {
            consumer.unsubscribe();
        }
    }

    async fn poll(&self) -> Option<Vec<Event>> {
        let interrupted = self.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }
        let consumer = self.consumer.read().clone()?;

        {
            let mut early = self.early.lock();
            if !early.is_empty() {
                let take = early.len().min(self.settings.max_batch_size);
                return Some(early.drain(..take).collect());
            }
        }

        let first = tokio::select! {
            _ = &mut interrupted => {
                debug!("Kafka receive interrupted by unsubscribe");
                return None;
            }
            r = tokio::time::timeout(self.settings.poll_timeout, consumer.recv()) => r,
        };

        let mut batch = Vec::new();
        match first {
            Err(_) => return Some(batch),
            Ok(Err(e)) => {
                error!(error = %e, "Kafka receive failed");
                return None;
            }
            Ok(Ok(message)) => codec::push_decoded(&mut batch, message.payload()),
        }

        while batch.len() < self.settings.max_batch_size {
            match consumer.recv().now_or_never() {
                Some(Ok(message)) => codec::push_decoded(&mut batch, message.payload()),
                Some(Err(e)) => {
                    error!(error = %e, "Kafka receive failed mid-batch");
                    break;
                }
                None => break,
            }
        }
        counter!("cellbase_bus_messages_received_total", "broker" => "kafka")
            .increment(batch.len() as u64);
        Some(batch)
    }
}

#[async_trait]
impl EventReceiver for KafkaConsumer {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.attach(topic).await
    }

    async fn receive(&self) -> Option<Vec<Event>> {
        self.poll().await
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.detach();
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for KafkaConsumer {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.attach(topic).await
    }

    async fn receive(&self) -> Option<Vec<Event>> {
        self.poll().await
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.detach();
        Ok(())
    }
}
