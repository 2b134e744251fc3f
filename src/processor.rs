use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ProcessingError;
use crate::models::{Event, EventRecord, EventType};
use crate::store::EventRepository;

// ============================================================================
// Event Processor
// ============================================================================
//
// Deserializes a consumed record and applies the domain operation. This is
// the unit that may fail; everything upstream (consumers, scheduler) drives
// it through the classification pipeline.
//
// ============================================================================

/// Reserved entity id that always raises the recoverable-infrastructure
/// error, so the retry and scheduler paths can be exercised on demand.
pub const RECOVERABLE_SENTINEL_ID: i32 = 999;

/// Seam between the drivers (consumers, scheduler, pipeline) and the domain
/// logic; test drivers substitute counting implementations here.
#[async_trait]
pub trait ProcessEvent: Send + Sync {
    async fn process(&self, record: &EventRecord) -> Result<(), ProcessingError>;
}

pub struct EventProcessor {
    repository: Arc<dyn EventRepository>,
}

impl EventProcessor {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self { repository }
    }

    async fn validate(&self, event: &Event) -> Result<(), ProcessingError> {
        if event.id == Some(RECOVERABLE_SENTINEL_ID) {
            return Err(ProcessingError::infra("sentinel id raised for recovery testing"));
        }
        let id = event.id.ok_or(ProcessingError::MissingId)?;
        let existing = self
            .repository
            .find_by_id(id)
            .await
            .map_err(ProcessingError::infra)?;
        match existing {
            Some(_) => {
                tracing::debug!(event_id = id, "validation successful");
                Ok(())
            }
            None => Err(ProcessingError::UnknownEvent(id)),
        }
    }

    async fn save(&self, event: Event) -> Result<(), ProcessingError> {
        let stored = self
            .repository
            .save(event)
            .await
            .map_err(ProcessingError::infra)?;
        tracing::info!(event_id = ?stored.id, book = %stored.book.name, "persisted event");
        Ok(())
    }
}

#[async_trait]
impl ProcessEvent for EventProcessor {
    async fn process(&self, record: &EventRecord) -> Result<(), ProcessingError> {
        let event: Event = serde_json::from_str(&record.payload)?;
        tracing::debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            event_type = ?event.event_type,
            "processing event"
        );

        match event.event_type {
            EventType::New => self.save(event).await,
            EventType::Update => {
                self.validate(&event).await?;
                self.save(event).await
            }
            EventType::Unknown => {
                tracing::info!(
                    topic = %record.topic,
                    offset = record.offset,
                    "ignoring event with unrecognized type"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemoryEventRepository;

    fn record(payload: &str) -> EventRecord {
        EventRecord {
            topic: "library-events".to_string(),
            partition: 0,
            offset: 1,
            key: None,
            payload: payload.to_string(),
        }
    }

    fn processor() -> (EventProcessor, Arc<InMemoryEventRepository>) {
        let repo = Arc::new(InMemoryEventRepository::new());
        (EventProcessor::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn new_event_is_persisted_with_assigned_id() {
        let (processor, repo) = processor();
        let rec = record(r#"{"id":null,"type":"NEW","book":{"id":5,"name":"Dune"}}"#);

        processor.process(&rec).await.unwrap();

        assert!(repo.find_by_id(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn processing_the_same_new_event_twice_creates_two_entities() {
        let (processor, repo) = processor();
        let rec = record(r#"{"id":null,"type":"NEW","book":{"id":5,"name":"Dune"}}"#);

        processor.process(&rec).await.unwrap();
        processor.process(&rec).await.unwrap();

        assert!(repo.find_by_id(1).await.unwrap().is_some());
        assert!(repo.find_by_id(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_without_id_is_fatal() {
        let (processor, _) = processor();
        let rec = record(r#"{"id":null,"type":"UPDATE","book":{"id":123,"name":"X"}}"#);

        let err = processor.process(&rec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingId);
    }

    #[tokio::test]
    async fn update_of_unknown_entity_is_fatal() {
        let (processor, _) = processor();
        let rec = record(r#"{"id":42,"type":"UPDATE","book":{"id":123,"name":"X"}}"#);

        let err = processor.process(&rec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownEvent);
    }

    #[tokio::test]
    async fn update_of_existing_entity_succeeds() {
        let (processor, repo) = processor();
        processor
            .process(&record(r#"{"id":null,"type":"NEW","book":{"id":5,"name":"Dune"}}"#))
            .await
            .unwrap();

        processor
            .process(&record(r#"{"id":1,"type":"UPDATE","book":{"id":5,"name":"Dune II"}}"#))
            .await
            .unwrap();

        let stored = repo.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.book.name, "Dune II");
    }

    #[tokio::test]
    async fn sentinel_id_raises_recoverable_infra() {
        let (processor, _) = processor();
        let rec = record(r#"{"id":999,"type":"UPDATE","book":{"id":123,"name":"X"}}"#);

        let err = processor.process(&rec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecoverableInfra);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn unknown_type_is_a_no_op() {
        let (processor, repo) = processor();
        let rec = record(r#"{"id":null,"type":"DELETE","book":{"id":5,"name":"Dune"}}"#);

        processor.process(&rec).await.unwrap();
        assert!(repo.find_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_a_deserialization_error() {
        let (processor, _) = processor();
        let err = processor.process(&record("not json")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }
}
