use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProcessingError;
use crate::models::EventRecord;
use crate::store::{FailureStatus, FailureStore, NewFailureRecord};

// ============================================================================
// Recovery Callbacks
// ============================================================================
//
// Terminal handlers invoked once retries are exhausted (or skipped for
// ignored errors). Exactly one strategy is wired per deployment:
//
// - PersistToStore (canonical): quarantine the record in the failure table,
//   RETRY rows eligible for the scheduler sweep, DEAD rows kept for audit.
// - PublishToTopic: republish the original key/payload to the retry or
//   dead-letter topic with exception headers.
//
// Both apply the same fine-grained classification: a recoverable
// infrastructure cause routes to RETRY / the retry topic, everything else
// to DEAD / the dead-letter topic.
//
// ============================================================================

pub const HEADER_EXCEPTION_CLASS: &str = "exception-class";
pub const HEADER_EXCEPTION_MESSAGE: &str = "exception-message";

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait RecoveryCallback: Send + Sync {
    async fn recover(&self, record: &EventRecord, error: &ProcessingError) -> Result<()>;
}

// ============================================================================
// Persist-to-Store Strategy
// ============================================================================

pub struct PersistToStore {
    store: Arc<dyn FailureStore>,
}

impl PersistToStore {
    pub fn new(store: Arc<dyn FailureStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecoveryCallback for PersistToStore {
    async fn recover(&self, record: &EventRecord, error: &ProcessingError) -> Result<()> {
        let status = if error.is_recoverable() {
            FailureStatus::Retry
        } else {
            FailureStatus::Dead
        };

        tracing::error!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            error = %error,
            status = status.as_str(),
            "💀 quarantining failed record"
        );

        let saved = self
            .store
            .save(NewFailureRecord {
                topic: record.topic.clone(),
                key: record.key,
                payload: record.payload.clone(),
                partition: record.partition,
                offset: record.offset,
                exception_message: error.to_string(),
                status,
            })
            .await
            .context("failed to persist failure record")?;

        tracing::info!(failure_id = saved.id, status = status.as_str(), "failure record stored");
        Ok(())
    }
}

// ============================================================================
// Publish-to-Topic Strategy
// ============================================================================

struct TopicTarget {
    name: String,
    partitions: i32,
}

impl TopicTarget {
    fn discover(producer: &FutureProducer, topic: &str) -> Result<Self> {
        let metadata = producer
            .client()
            .fetch_metadata(Some(topic), METADATA_TIMEOUT)
            .with_context(|| format!("failed to fetch metadata for topic {topic}"))?;
        let partitions = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .map(|t| t.partitions().len() as i32)
            .unwrap_or(0);
        Ok(Self {
            name: topic.to_string(),
            partitions,
        })
    }
}

/// Keep the original partition index, wrapped into the destination topic's
/// partition range. An unknown count falls back to the broker's partitioner.
fn destination_partition(original: i32, partition_count: i32) -> Option<i32> {
    (partition_count > 0).then(|| original % partition_count)
}

pub struct PublishToTopic {
    producer: FutureProducer,
    retry: TopicTarget,
    dead_letter: TopicTarget,
}

impl PublishToTopic {
    pub fn new(producer: FutureProducer, retry_topic: &str, dead_letter_topic: &str) -> Result<Self> {
        let retry = TopicTarget::discover(&producer, retry_topic)?;
        let dead_letter = TopicTarget::discover(&producer, dead_letter_topic)?;
        Ok(Self {
            producer,
            retry,
            dead_letter,
        })
    }
}

#[async_trait]
impl RecoveryCallback for PublishToTopic {
    async fn recover(&self, record: &EventRecord, error: &ProcessingError) -> Result<()> {
        let target = if error.is_recoverable() {
            &self.retry
        } else {
            &self.dead_letter
        };

        tracing::error!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            error = %error,
            destination = %target.name,
            "republishing failed record"
        );

        let message = error.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: HEADER_EXCEPTION_CLASS,
                value: Some(error.kind().as_str()),
            })
            .insert(Header {
                key: HEADER_EXCEPTION_MESSAGE,
                value: Some(message.as_str()),
            });

        let key = record.key.map(EventRecord::encode_key);
        let mut future_record: FutureRecord<'_, [u8], String> =
            FutureRecord::to(&target.name)
                .payload(&record.payload)
                .headers(headers);
        if let Some(ref key) = key {
            future_record = future_record.key(key.as_slice());
        }
        if let Some(partition) = destination_partition(record.partition, target.partitions) {
            future_record = future_record.partition(partition);
        }

        self.producer
            .send(future_record, Timeout::After(PUBLISH_TIMEOUT))
            .await
            .map_err(|(err, _)| {
                anyhow::anyhow!("failed to republish to {}: {err}", target.name)
            })?;

        tracing::info!(destination = %target.name, "failed record republished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFailureStore;

    fn record() -> EventRecord {
        EventRecord {
            topic: "library-events".to_string(),
            partition: 2,
            offset: 17,
            key: Some(999),
            payload: r#"{"id":999,"type":"UPDATE","book":{"id":1,"name":"Dune"}}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn recoverable_error_persists_a_retry_row() {
        let store = Arc::new(InMemoryFailureStore::new());
        let callback = PersistToStore::new(store.clone());

        callback
            .recover(&record(), &ProcessingError::infra("db down"))
            .await
            .unwrap();

        let rows = store.find_by_status(FailureStatus::Retry).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].topic, "library-events");
        assert_eq!(rows[0].key, Some(999));
        assert_eq!(rows[0].offset, 17);
        assert!(rows[0].exception_message.contains("db down"));
    }

    #[tokio::test]
    async fn fatal_error_persists_a_dead_row() {
        let store = Arc::new(InMemoryFailureStore::new());
        let callback = PersistToStore::new(store.clone());

        callback
            .recover(&record(), &ProcessingError::MissingId)
            .await
            .unwrap();

        assert!(store.find_by_status(FailureStatus::Retry).await.unwrap().is_empty());
        let rows = store.find_by_status(FailureStatus::Dead).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn partition_wraps_into_destination_range() {
        assert_eq!(destination_partition(2, 6), Some(2));
        assert_eq!(destination_partition(5, 3), Some(2));
        assert_eq!(destination_partition(4, 0), None);
    }
}
