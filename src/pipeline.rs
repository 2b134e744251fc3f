use anyhow::Result;
use std::sync::Arc;
use tokio::time::sleep;

use crate::backoff::BackoffPolicy;
use crate::error::{Classification, ErrorClassifier};
use crate::models::EventRecord;
use crate::processor::ProcessEvent;
use crate::recovery::RecoveryCallback;

// ============================================================================
// Record Pipeline
// ============================================================================
//
// Drives a single record to terminal resolution: process, classify on
// failure, re-invoke per the backoff schedule, and hand off to the recovery
// callback once exhausted. Shared by the primary and retry consumers so both
// apply identical failure handling.
//
// Backoff sleeps block only the calling worker; other partitions keep
// flowing.
//
// ============================================================================

pub struct RecordPipeline {
    processor: Arc<dyn ProcessEvent>,
    classifier: ErrorClassifier,
    backoff: BackoffPolicy,
    recovery: Arc<dyn RecoveryCallback>,
}

impl RecordPipeline {
    pub fn new(
        processor: Arc<dyn ProcessEvent>,
        classifier: ErrorClassifier,
        backoff: BackoffPolicy,
        recovery: Arc<dyn RecoveryCallback>,
    ) -> Self {
        Self {
            processor,
            classifier,
            backoff,
            recovery,
        }
    }

    /// Resolve one record. `Ok` means the record reached a terminal state
    /// (processed, or recovery completed) and its offset may be committed;
    /// `Err` means the recovery callback itself failed and the record must
    /// not be acknowledged.
    pub async fn resolve(&self, record: &EventRecord) -> Result<()> {
        let mut error = match self.processor.process(record).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if self.classifier.classify(&error) == Classification::Ignored {
            tracing::warn!(
                topic = %record.topic,
                offset = record.offset,
                error = %error,
                "error is not retryable, resolving immediately"
            );
            return self.recovery.recover(record, &error).await;
        }

        let mut attempt = 1u32;
        for delay in self.backoff.delays() {
            tracing::info!(
                topic = %record.topic,
                offset = record.offset,
                delivery_attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "record failed, backing off before redelivery"
            );
            sleep(delay).await;
            attempt += 1;

            match self.processor.process(record).await {
                Ok(()) => {
                    tracing::info!(
                        topic = %record.topic,
                        offset = record.offset,
                        delivery_attempt = attempt,
                        "record succeeded after retry"
                    );
                    return Ok(());
                }
                Err(err) => error = err,
            }
        }

        tracing::error!(
            topic = %record.topic,
            offset = record.offset,
            attempts = attempt,
            error = %error,
            "retries exhausted, invoking recovery"
        );
        self.recovery.recover(record, &error).await
    }
}
