//! Requires a broker at `CB_TEST_KAFKA_BROKER` (default `localhost:9092`).

#![cfg(feature = "kafka")]

use std::time::Duration;

use cb_bus::EventBus;
use cb_config::EventBusConfig;
use cb_event::{Event, Level};
use tokio_test::assert_ok;

#[tokio::test]
#[ignore = "requires a running Kafka broker"]
async fn test_kafka_send_then_subscribe() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let broker = std::env::var("CB_TEST_KAFKA_BROKER")
        .unwrap_or_else(|_| "localhost:9092".to_string());
    let bus = EventBus::from_config(&EventBusConfig {
        mq: Some("kafka".to_string()),
        broker: Some(broker),
        ..EventBusConfig::default()
    })
    .unwrap();

    let topic = format!("t1-{}", uuid::Uuid::new_v4());
    let subscriber = bus.create_subscriber().unwrap();
    let sender = bus.create_sender().unwrap();
    assert_ok!(subscriber.subscribe(&topic).await);
    assert_ok!(sender.open(&topic).await);

    let event = Event::new(Level::Warn, "PUT", "/cell/box", "204");
    assert_ok!(sender.send(&event).await);

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
    assert_ok!(sender.close().await);
}

