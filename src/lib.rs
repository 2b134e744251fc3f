//! Library events ingestion with bounded, observable failure recovery.
//!
//! Events published to the main topic are applied by the [`processor`];
//! failures run through coarse classification and backoff in the
//! [`pipeline`], then land in a terminal [`recovery`] handler — a durable
//! failure table or a retry/dead-letter topic. The [`scheduler`] sweeps
//! stored RETRY records out-of-band, and an independent retry-topic consumer
//! re-enters the same pipeline.
//!
//! Delivery is at-least-once; idempotency is the downstream writer's job.

pub mod backoff;
pub mod config;
pub mod consumer;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod producer;
pub mod recovery;
pub mod scheduler;
pub mod store;

pub use backoff::BackoffPolicy;
pub use config::{AppConfig, RecoveryStrategy};
pub use error::{Classification, ErrorClassifier, ErrorKind, ProcessingError};
pub use models::{Book, Event, EventRecord, EventType};
pub use pipeline::RecordPipeline;
pub use processor::{EventProcessor, ProcessEvent};
pub use recovery::{PersistToStore, PublishToTopic, RecoveryCallback};
pub use scheduler::RecoveryScheduler;
pub use store::{FailureRecord, FailureStatus, FailureStore};
