use async_trait::async_trait;
use cb_event::Event;

use crate::Result;

/// Point-to-point delivery of events.
///
/// `send` may be called concurrently once open; `open` and `close` must be
/// serialized by the owner of the sender.
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn open(&self, topic: &str) -> Result<()>;

    /// Completes once the broker has durably accepted the event
    async fn send(&self, event: &Event) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Fan-out of raw event data keyed by a logical scope (usually a cell URL)
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn open(&self, topic: &str) -> Result<()>;

    async fn publish(&self, scope_url: &str, data: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Competing consumer: each event goes to one receiver of the group.
///
/// `receive` blocks up to the poll timeout and returns the batch read in
/// that cycle. `None` means no events this cycle, whether because the
/// receiver was interrupted by `unsubscribe`, is not subscribed, or the
/// broker failed.
#[async_trait]
pub trait EventReceiver: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn receive(&self) -> Option<Vec<Event>>;

    async fn unsubscribe(&self) -> Result<()>;
}

/// Broadcast consumer: every subscriber sees every event. Same polling
/// contract as [`EventReceiver`].
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn receive(&self) -> Option<Vec<Event>>;

    async fn unsubscribe(&self) -> Result<()>;
}
