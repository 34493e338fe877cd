use async_trait::async_trait;
use berth_core::{CoreError, CoreResult, EventSink};
use berth_shared::BookingEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// In-process fan-out of booking events. Publishing with no subscriber is not an error.
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
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(event = event.name(), key = %event.key(), receivers, "event broadcast");
        Ok(())
    }
}

/// Publishes to every sink; the first failure is reported after all have been tried.
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn publish(&self, event: &BookingEvent) -> CoreResult<()> {
        let mut first_error: Option<CoreError> = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaEventProducer;

#[cfg(feature = "kafka")]
mod kafka {
    use super::*;
    use rdkafka::config::ClientConfig;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::util::Timeout;
    use std::time::Duration;
    use tracing::{error, info};

    #[derive(Clone)]
    pub struct KafkaEventProducer {
        producer: FutureProducer,
        topic: String,
    }

    impl KafkaEventProducer {
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
    impl EventSink for KafkaEventProducer {
        async fn publish(&self, event: &BookingEvent) -> CoreResult<()> {
            let payload = serde_json::to_string(event).map_err(|e| CoreError::StorageError(e.to_string()))?;
            let key = event.key();
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
                    Err(CoreError::StorageError(format!("kafka: {}", e)))
                }
            }
        }
    }
}
