//! Requires a broker at `CB_TEST_AMQP_BROKER` (default `localhost:5672`).

#![cfg(feature = "amqp")]

use std::time::Duration;

use cb_bus::EventBus;
use cb_config::EventBusConfig;
use cb_event::{Event, Level};
use tokio_test::assert_ok;

fn bus() -> EventBus {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let broker = std::env::var("CB_TEST_AMQP_BROKER")
        .unwrap_or_else(|_| "localhost:5672".to_string());
    EventBus::from_config(&EventBusConfig {
        mq: Some("amqp".to_string()),
        broker: Some(broker),
        ..EventBusConfig::default()
    })
    .unwrap()
}

#[tokio::test]
#[ignore = "requires a running AMQP broker"]
async fn test_amqp_publish_then_subscribe() {
    let bus = bus();
    let exchange = format!("t1-{}", uuid::Uuid::new_v4());
    let subscriber = bus.create_subscriber().unwrap();
    let publisher = bus.create_publisher().unwrap();
    assert_ok!(subscriber.subscribe(&exchange).await);
    assert_ok!(publisher.open(&exchange).await);

    let event = Event::new(Level::Error, "DELETE", "/cell/box/col", "404");
    let data = serde_json::to_string(&event).unwrap();
    assert_ok!(publisher.publish("https://cell.example/cell/", &data).await);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    let mut received = Vec::new();
    while received.is_empty() && tokio::time::Instant::now() < deadline {
        if let Some(batch) = subscriber.receive().await {
            received.extend(batch);
        }
    }
    assert_eq!(received, vec![event]);

    assert_ok!(subscriber.unsubscribe().await);
    assert_eq!(subscriber.receive().await, None);
    assert_ok!(publisher.close().await);
}

#[tokio::test]
#[ignore = "requires a running AMQP broker"]
async fn test_amqp_send_then_receive() {
    let bus = bus();
    let queue = format!("q1-{}", uuid::Uuid::new_v4());
    let sender = bus.create_sender().unwrap();
    let receiver = bus.create_receiver().unwrap();

    // the durable queue keeps what was confirmed before anyone consumes it
    assert_ok!(sender.open(&queue).await);
    let event = Event::new(Level::Info, "POST", "/cell/box/col/Entity", "201");
    assert_ok!(sender.send(&event).await);

    assert_ok!(receiver.subscribe(&queue).await);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    let mut received = Vec::new();
    while received.is_empty() && tokio::time::Instant::now() < deadline {
        if let Some(batch) = receiver.receive().await {
            received.extend(batch);
        }
    }
    assert_eq!(received, vec![event]);

    assert_ok!(receiver.unsubscribe().await);
    assert_eq!(receiver.receive().await, None);
    assert_ok!(sender.close().await);
}
