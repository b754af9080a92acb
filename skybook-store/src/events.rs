use async_trait::async_trait;
use skybook_core::{CoreError, CoreResult, EventSink};
use skybook_shared::BookingEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Writes every event to the log as JSON. Always installed, so the event
/// stream is visible even without a broker.
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: &BookingEvent) -> CoreResult<()> {
        let payload = serde_json::to_string(event).map_err(|e| CoreError::PublishError(e.to_string()))?;
        info!(event = event.name(), booking_id = %event.booking_id(), %payload, "Booking event");
        Ok(())
    }
}

/// In-process fan-out for live seat-map subscribers.
#[derive(Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<BookingEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: &BookingEvent) -> CoreResult<()> {
        // No receivers is fine; nobody is watching the seat map.
        if self.sender.send(event.clone()).is_err() {
            debug!(event = event.name(), "No live subscribers");
        }
        Ok(())
    }
}

/// Publishes to every inner sink. All sinks are attempted; the first error is
/// reported.
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn publish(&self, event: &BookingEvent) -> CoreResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaEventSink;

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::error;

    /// Publishes booking events to a Kafka topic keyed by booking id, so all
    /// events of one booking land on the same partition in order.
    #[derive(Clone)]
    pub struct KafkaEventSink {
        producer: FutureProducer,
        topic: String,
    }

    impl KafkaEventSink {
        pub fn new(brokers: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("message.timeout.ms", "5000")
                .create()?;

            Ok(Self {
                producer,
                topic: topic.to_string(),
            })
        }
    }

    #[async_trait]
    impl EventSink for KafkaEventSink {
        async fn publish(&self, event: &BookingEvent) -> CoreResult<()> {
            let payload = serde_json::to_string(event).map_err(|e| CoreError::PublishError(e.to_string()))?;
            let key = event.booking_id().to_string();
            let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

            match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!(
                        "Sent {} to {}/{}: partition {} offset {}",
                        event.name(),
                        self.topic,
                        key,
                        delivery.partition,
                        delivery.offset
                    );
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send {} to {}: {}", event.name(), self.topic, e);
                    Err(CoreError::PublishError(e.to_string()))
                }
            }
        }
    }
}
