use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use library_events::config::{AppConfig, RecoveryStrategy};
use library_events::consumer;
use library_events::error::ErrorClassifier;
use library_events::pipeline::RecordPipeline;
use library_events::processor::{EventProcessor, ProcessEvent};
use library_events::producer::create_future_producer;
use library_events::recovery::{PersistToStore, PublishToTopic, RecoveryCallback};
use library_events::scheduler::RecoveryScheduler;
use library_events::store::{
    FailureStore, InMemoryEventRepository, InMemoryFailureStore, PostgresFailureStore,
};

// ============================================================================
// Composition Root
// ============================================================================
//
// All wiring happens here, by constructor: classifier, backoff, failure
// store, recovery strategy, both consumer groups, and the recovery
// scheduler. No reflection, no container.
//
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,library_events=debug")),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        brokers = %config.brokers,
        main_topic = %config.topics.main,
        retry_topic = %config.topics.retry,
        dead_letter_topic = %config.topics.dead_letter,
        concurrency = config.concurrency,
        "🚀 starting library events consumer"
    );

    let store: Arc<dyn FailureStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("connecting to PostgreSQL failure store");
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let store = PostgresFailureStore::new(pool);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, failure records are kept in memory only");
            Arc::new(InMemoryFailureStore::new())
        }
    };

    let repository = Arc::new(InMemoryEventRepository::new());
    let processor: Arc<dyn ProcessEvent> = Arc::new(EventProcessor::new(repository));

    let recovery: Arc<dyn RecoveryCallback> = match config.recovery_strategy {
        RecoveryStrategy::PersistToStore => Arc::new(PersistToStore::new(store.clone())),
        RecoveryStrategy::PublishToTopic => {
            let producer = create_future_producer(&config.brokers)?;
            Arc::new(PublishToTopic::new(
                producer,
                &config.topics.retry,
                &config.topics.dead_letter,
            )?)
        }
    };

    let pipeline = Arc::new(RecordPipeline::new(
        processor.clone(),
        ErrorClassifier::default(),
        config.backoff.clone(),
        recovery,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = consumer::spawn_workers(
        "primary",
        &config.brokers,
        &config.group_id,
        &config.topics.main,
        &config.auto_offset_reset,
        config.concurrency,
        pipeline.clone(),
        shutdown_rx.clone(),
    )?;
    handles.extend(consumer::spawn_workers(
        "retry",
        &config.brokers,
        &config.retry_group_id,
        &config.topics.retry,
        &config.auto_offset_reset,
        config.concurrency,
        pipeline.clone(),
        shutdown_rx.clone(),
    )?);

    let scheduler = RecoveryScheduler::new(store, processor, config.scheduler_interval);
    handles.push(tokio::spawn(scheduler.run(shutdown_rx)));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining in-flight work");
    let _ = shutdown_tx.send(true);
    futures_util::future::join_all(handles).await;
    tracing::info!("shutdown complete");

    Ok(())
}
