//! Embedded in-process broker.
//!
//! Each topic is a `tokio::sync::broadcast` channel. Every consumer attached
//! to a topic sees every message sent after it subscribed; messages sent to a
//! topic nobody listens on are dropped. A topic's channel is removed once its
//! last consumer detaches. Used for single-node development and tests.

use async_trait::async_trait;
use cb_event::Event;
use dashmap::DashMap;
use futures::FutureExt;
use metrics::counter;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, warn};

use crate::codec;
use crate::traits::{EventPublisher, EventReceiver, EventSender, EventSubscriber};
use crate::{BusError, Result};

const TOPIC_CAPACITY: usize = 1024;

struct BrokerInner {
    topics: DashMap<String, broadcast::Sender<String>>,
    poll_timeout: Duration,
    max_batch_size: usize,
}

#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new(poll_timeout: Duration, max_batch_size: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                poll_timeout,
                max_batch_size: max_batch_size.max(1),
            }),
        }
    }

    /// Subscribes under the entry lock so a concurrent `prune` cannot
    /// release the channel in between
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        self.inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Sender for `topic` only while someone listens on it
    fn listening(&self, topic: &str) -> Option<broadcast::Sender<String>> {
        self.inner.topics.get(topic).map(|tx| tx.clone())
    }

    fn prune(&self, topic: &str) {
        if self.inner.topics.remove_if(topic, |_, tx| tx.receiver_count() == 0).is_some() {
            debug!(topic = %topic, "Embedded topic released");
        }
    }

    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            broker: self.clone(),
            target: RwLock::new(None),
        }
    }

    pub fn consumer(&self) -> InMemoryConsumer {
        InMemoryConsumer {
            broker: self.clone(),
            rx: Mutex::new(None),
            active: AtomicBool::new(false),
            interrupt: Notify::new(),
        }
    }
}

// ============================================================================
// Producer
// ============================================================================

pub struct InMemoryProducer {
    broker: InMemoryBroker,
    target: RwLock<Option<String>>,
}

impl InMemoryProducer {
    fn deliver(&self, payload: String) -> Result<()> {
        let topic = self.target.read().clone().ok_or(BusError::NotOpen)?;
        // Err only means nobody is subscribed right now
        let delivered = self
            .broker
            .listening(&topic)
            .map(|tx| tx.send(payload).is_ok())
            .unwrap_or(false);
        if !delivered {
            debug!(topic = %topic, "No subscribers, message dropped");
        }
        counter!("cellbase_bus_messages_sent_total", "broker" => "memory").increment(1);
        Ok(())
    }

    fn attach(&self, topic: &str) {
        *self.target.write() = Some(topic.to_string());
    }
}

#[async_trait]
impl EventSender for InMemoryProducer {
    async fn open(&self, topic: &str) -> Result<()> {
        self.attach(topic);
        Ok(())
    }

    async fn send(&self, event: &Event) -> Result<()> {
        self.deliver(codec::encode(event)?)
    }

    async fn close(&self) -> Result<()> {
        self.target.write().take();
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for InMemoryProducer {
    async fn open(&self, topic: &str) -> Result<()> {
        self.attach(topic);
        Ok(())
    }

    async fn publish(&self, _scope_url: &str, data: &str) -> Result<()> {
        self.deliver(data.to_string())
    }

    async fn close(&self) -> Result<()> {
        self.target.write().take();
        Ok(())
    }
}

// ============================================================================
// Consumer
// ============================================================================

pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    rx: Mutex<Option<(String, broadcast::Receiver<String>)>>,
    active: AtomicBool,
    interrupt: Notify,
}

impl InMemoryConsumer {
    async fn attach(&self, topic: &str) {
        let rx = self.broker.subscribe(topic);
        let previous = self.rx.lock().await.replace((topic.to_string(), rx));
        if let Some((old, rx)) = previous {
            drop(rx);
            self.broker.prune(&old);
        }
        self.active.store(true, Ordering::SeqCst);
    }

    async fn detach(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.interrupt.notify_waiters();
        let attached = self.rx.lock().await.take();
        if let Some((topic, rx)) = attached {
            drop(rx);
            self.broker.prune(&topic);
        }
    }

    async fn poll(&self) -> Option<Vec<Event>> {
        let interrupted = self.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }

        let mut guard = self.rx.lock().await;
        let (_, rx) = guard.as_mut()?;
        let first = tokio::select! {
            _ = &mut interrupted => {
                debug!("Receive interrupted by unsubscribe");
                return None;
            }
            r = tokio::time::timeout(self.broker.inner.poll_timeout, rx.recv()) => r,
        };

        let mut batch = Vec::new();
        match first {
            Err(_) => return Some(batch),
            Ok(Ok(payload)) => codec::push_decoded(&mut batch, Some(payload.as_bytes())),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!(skipped, "Embedded consumer lagged, messages skipped");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => return None,
        }

        while batch.len() < self.broker.inner.max_batch_size {
            match rx.recv().now_or_never() {
                Some(Ok(payload)) => codec::push_decoded(&mut batch, Some(payload.as_bytes())),
                Some(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Embedded consumer lagged, messages skipped");
                }
                _ => break,
            }
        }
        counter!("cellbase_bus_messages_received_total", "broker" => "memory")
            .increment(batch.len() as u64);
        Some(batch)
    }
}

#[async_trait]
impl EventReceiver for InMemoryConsumer {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.attach(topic).await;
        Ok(())
    }

    async fn receive(&self) -> Option<Vec<Event>> {
        self.poll().await
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.detach().await;
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for InMemoryConsumer {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.attach(topic).await;
        Ok(())
    }

    async fn receive(&self) -> Option<Vec<Event>> {
        self.poll().await
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.detach().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_event::Level;

    fn broker() -> InMemoryBroker {
        InMemoryBroker::new(Duration::from_millis(50), 10)
    }

    #[tokio::test]
    async fn test_send_before_open_fails() {
        let producer = broker().producer();
        let err = EventSender::send(&producer, &Event::new(Level::Info, "a", "o", "r"))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::NotOpen));
    }

    #[tokio::test]
    async fn test_empty_poll_returns_empty_batch() {
        let consumer = broker().consumer();
        EventReceiver::subscribe(&consumer, "t1").await.unwrap();
        assert_eq!(EventReceiver::receive(&consumer).await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_receive_without_subscription_is_none() {
        let consumer = broker().consumer();
        assert_eq!(EventReceiver::receive(&consumer).await, None);
    }

    #[tokio::test]
    async fn test_batch_is_capped() {
        let broker = InMemoryBroker::new(Duration::from_millis(50), 3);
        let producer = broker.producer();
        let consumer = broker.consumer();
        EventReceiver::subscribe(&consumer, "t1").await.unwrap();
        EventSender::open(&producer, "t1").await.unwrap();

        for i in 0..5 {
            EventSender::send(&producer, &Event::new(Level::Info, format!("a{}", i), "o", "r"))
                .await
                .unwrap();
        }

        let first = EventReceiver::receive(&consumer).await.unwrap();
        let second = EventReceiver::receive(&consumer).await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].action, "a4");
    }

    #[tokio::test]
    async fn test_unsubscribe_interrupts_pending_receive() {
        let broker = InMemoryBroker::new(Duration::from_secs(30), 10);
        let consumer = Arc::new(broker.consumer());
        EventSubscriber::subscribe(consumer.as_ref(), "t1").await.unwrap();

        let waiting = {
            let consumer = consumer.clone();
            tokio::spawn(async move { EventSubscriber::receive(consumer.as_ref()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        EventSubscriber::unsubscribe(consumer.as_ref()).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), waiting).await.unwrap().unwrap();
        assert_eq!(result, None);
        assert_eq!(EventSubscriber::receive(consumer.as_ref()).await, None);
    }

    #[tokio::test]
    async fn test_topic_released_after_last_consumer() {
        let broker = broker();
        let producer = broker.producer();
        let first = broker.consumer();
        let second = broker.consumer();
        EventSubscriber::subscribe(&first, "t1").await.unwrap();
        EventSubscriber::subscribe(&second, "t1").await.unwrap();
        EventSender::open(&producer, "t1").await.unwrap();
        assert_eq!(broker.topic_count(), 1);

        EventSubscriber::unsubscribe(&first).await.unwrap();
        assert_eq!(broker.topic_count(), 1);
        EventSubscriber::unsubscribe(&second).await.unwrap();
        assert_eq!(broker.topic_count(), 0);

        // sending to a released topic drops the message without recreating it
        EventSender::send(&producer, &Event::new(Level::Info, "a", "o", "r")).await.unwrap();
        assert_eq!(broker.topic_count(), 0);

        EventSubscriber::subscribe(&first, "t1").await.unwrap();
        EventSender::send(&producer, &Event::new(Level::Info, "b", "o", "r")).await.unwrap();
        let batch = EventSubscriber::receive(&first).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, "b");
    }
}
