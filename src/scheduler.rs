use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::processor::ProcessEvent;
use crate::store::{FailureStatus, FailureStore};

// ============================================================================
// Recovery Scheduler
// ============================================================================
//
// Out-of-band recovery path: a ticking loop that re-drives RETRY rows
// through the event processor directly, bypassing the broker. Rows are
// processed sequentially within a sweep, and a sweep always completes before
// the next tick fires. Cancellation takes effect between ticks, not
// mid-sweep.
//
// A row that keeps failing stays RETRY and is picked up again on every tick;
// there is no sweep-attempt cap.
//
// ============================================================================

pub struct RecoveryScheduler {
    store: Arc<dyn FailureStore>,
    processor: Arc<dyn ProcessEvent>,
    tick_interval: Duration,
}

impl RecoveryScheduler {
    pub fn new(
        store: Arc<dyn FailureStore>,
        processor: Arc<dyn ProcessEvent>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            processor,
            tick_interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_ms = self.tick_interval.as_millis() as u64, "recovery scheduler started");
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("recovery scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        tracing::error!(error = %err, "recovery sweep failed");
                    }
                }
            }
        }
    }

    /// One full sweep over the RETRY rows. Success flips a row to SUCCESS;
    /// failure leaves it RETRY for the next tick.
    pub async fn sweep(&self) -> Result<()> {
        let records = self.store.find_by_status(FailureStatus::Retry).await?;
        if records.is_empty() {
            tracing::debug!("no records eligible for retry");
            return Ok(());
        }

        tracing::info!(count = records.len(), "retrying failed records");
        for failure in records {
            let record = failure.to_event_record();
            match self.processor.process(&record).await {
                Ok(()) => match self.store.update_status(failure.id, FailureStatus::Success).await {
                    Ok(()) => {
                        tracing::info!(
                            failure_id = failure.id,
                            topic = %failure.topic,
                            offset = failure.offset,
                            "failed record reprocessed successfully"
                        );
                    }
                    Err(err) => {
                        tracing::error!(
                            failure_id = failure.id,
                            error = %err,
                            "reprocessed but could not mark record successful"
                        );
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        failure_id = failure.id,
                        topic = %failure.topic,
                        offset = failure.offset,
                        error = %err,
                        "record still failing, leaving for next sweep"
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::EventProcessor;
    use crate::store::{
        EventRepository, InMemoryEventRepository, InMemoryFailureStore, NewFailureRecord,
    };

    fn retry_row(payload: &str) -> NewFailureRecord {
        NewFailureRecord {
            topic: "library-events".to_string(),
            key: Some(1),
            payload: payload.to_string(),
            partition: 0,
            offset: 3,
            exception_message: "recoverable infrastructure failure: db down".to_string(),
            status: FailureStatus::Retry,
        }
    }

    fn scheduler() -> (RecoveryScheduler, Arc<InMemoryFailureStore>, Arc<InMemoryEventRepository>) {
        let store = Arc::new(InMemoryFailureStore::new());
        let repo = Arc::new(InMemoryEventRepository::new());
        let scheduler = RecoveryScheduler::new(
            store.clone(),
            Arc::new(EventProcessor::new(repo.clone())),
            Duration::from_millis(10_000),
        );
        (scheduler, store, repo)
    }

    #[tokio::test]
    async fn satisfiable_row_flips_to_success_after_one_sweep() {
        let (scheduler, store, repo) = scheduler();
        // The entity now exists, so the stored UPDATE can validate.
        repo.save(
            serde_json::from_str(r#"{"id":1,"type":"UPDATE","book":{"id":1,"name":"Dune"}}"#)
                .unwrap(),
        )
        .await
        .unwrap();
        store
            .save(retry_row(r#"{"id":1,"type":"UPDATE","book":{"id":1,"name":"Dune"}}"#))
            .await
            .unwrap();

        scheduler.sweep().await.unwrap();

        assert!(store.find_by_status(FailureStatus::Retry).await.unwrap().is_empty());
        assert_eq!(store.find_by_status(FailureStatus::Success).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unresolvable_row_stays_retry_across_sweeps() {
        let (scheduler, store, _) = scheduler();
        store
            .save(retry_row(r#"{"id":999,"type":"UPDATE","book":{"id":1,"name":"Dune"}}"#))
            .await
            .unwrap();

        for _ in 0..3 {
            scheduler.sweep().await.unwrap();
            assert_eq!(store.find_by_status(FailureStatus::Retry).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn dead_rows_are_not_swept() {
        let (scheduler, store, _) = scheduler();
        let mut row = retry_row(r#"{"id":null,"type":"UPDATE","book":{"id":1,"name":"Dune"}}"#);
        row.status = FailureStatus::Dead;
        store.save(row).await.unwrap();

        scheduler.sweep().await.unwrap();

        assert_eq!(store.find_by_status(FailureStatus::Dead).await.unwrap().len(), 1);
        assert!(store.find_by_status(FailureStatus::Success).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop_between_ticks() {
        let (scheduler, _, _) = scheduler();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(rx));
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
