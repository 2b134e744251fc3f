use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

use crate::models::{Event, EventRecord};

// ============================================================================
// Event Producer
// ============================================================================
//
// Thin publishing facade over the main topic. The send blocks on delivery
// with a bounded timeout and resolves into an explicit success or failure
// branch; ingress collaborators call this and are done.
//
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub fn create_future_producer(brokers: &str) -> Result<FutureProducer> {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "5000")
        .create()
        .context("failed to create Kafka producer")
}

pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(producer: FutureProducer, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    /// Publish an event envelope to the main topic, keyed by entity id when
    /// one is present.
    pub async fn send(&self, event: &Event) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let key = event.id.map(EventRecord::encode_key);

        let mut record: FutureRecord<'_, [u8], String> =
            FutureRecord::to(&self.topic).payload(&payload);
        if let Some(ref key) = key {
            record = record.key(key.as_slice());
        }

        match self.producer.send(record, Timeout::After(SEND_TIMEOUT)).await {
            Ok(delivery) => {
                tracing::info!(
                    topic = %self.topic,
                    key = ?event.id,
                    delivery = ?delivery,
                    "event published"
                );
                Ok(())
            }
            Err((err, _)) => {
                tracing::error!(
                    topic = %self.topic,
                    key = ?event.id,
                    error = %err,
                    "failed to publish event"
                );
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_creation_does_not_require_a_live_broker() {
        // rdkafka connects lazily; construction only validates config.
        assert!(create_future_producer("127.0.0.1:9092").is_ok());
    }
}
