use anyhow::{Context, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::EventRecord;
use crate::pipeline::RecordPipeline;

// ============================================================================
// Kafka Consumers
// ============================================================================
//
// The primary consumer reads the main topic; the retry consumer is the same
// loop in an independent group on the retry topic. Each runs a fixed number
// of worker tasks, one StreamConsumer per worker, so the group assigns every
// worker a disjoint partition subset and per-partition ordering holds.
//
// Offsets are committed only after a record is terminally resolved, which
// gives at-least-once delivery: a crash between the domain write and the
// commit re-delivers the record.
//
// ============================================================================

pub struct EventConsumer {
    consumer: StreamConsumer,
    pipeline: Arc<RecordPipeline>,
    role: &'static str,
    worker: usize,
}

impl EventConsumer {
    pub fn new(
        role: &'static str,
        worker: usize,
        brokers: &str,
        group_id: &str,
        topic: &str,
        auto_offset_reset: &str,
        pipeline: Arc<RecordPipeline>,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", auto_offset_reset)
            .create()
            .context("failed to create Kafka consumer")?;

        consumer
            .subscribe(&[topic])
            .with_context(|| format!("failed to subscribe to {topic}"))?;

        Ok(Self {
            consumer,
            pipeline,
            role,
            worker,
        })
    }

    /// Consume until shutdown. The in-flight record is always driven to
    /// terminal resolution before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(role = self.role, worker = self.worker, "consumer worker started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!(role = self.role, worker = self.worker, "consumer worker stopping");
                    break;
                }
                received = self.consumer.recv() => match received {
                    Ok(message) => self.handle(&message).await,
                    Err(err) => {
                        tracing::error!(
                            role = self.role,
                            worker = self.worker,
                            error = %err,
                            "failed to receive from broker"
                        );
                    }
                }
            }
        }
    }

    async fn handle(&self, message: &BorrowedMessage<'_>) {
        let record = EventRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: EventRecord::decode_key(message.key()),
            payload: message
                .payload()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .unwrap_or_default(),
        };

        match self.pipeline.resolve(&record).await {
            Ok(()) => {
                if let Err(err) = self.consumer.commit_message(message, CommitMode::Async) {
                    tracing::error!(
                        role = self.role,
                        topic = %record.topic,
                        offset = record.offset,
                        error = %err,
                        "offset commit failed"
                    );
                }
            }
            Err(err) => {
                // Leaving the offset uncommitted re-delivers the record
                // after a restart or rebalance.
                tracing::error!(
                    role = self.role,
                    topic = %record.topic,
                    offset = record.offset,
                    error = %err,
                    "recovery failed, offset left uncommitted"
                );
            }
        }
    }
}

/// Spawn `concurrency` workers for one consumer group. Every worker owns its
/// own broker connection; partition distribution is the group coordinator's
/// job.
#[allow(clippy::too_many_arguments)]
pub fn spawn_workers(
    role: &'static str,
    brokers: &str,
    group_id: &str,
    topic: &str,
    auto_offset_reset: &str,
    concurrency: usize,
    pipeline: Arc<RecordPipeline>,
    shutdown: watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>> {
    (0..concurrency)
        .map(|worker| {
            let consumer = EventConsumer::new(
                role,
                worker,
                brokers,
                group_id,
                topic,
                auto_offset_reset,
                pipeline.clone(),
            )?;
            Ok(tokio::spawn(consumer.run(shutdown.clone())))
        })
        .collect()
}
