use std::str::FromStr;
use std::time::Duration;

use crate::backoff::BackoffPolicy;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Plain structs with defaults, overridable from the environment. No
// framework discovery; the composition root reads this once and wires
// everything by hand.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct TopicsConfig {
    pub main: String,
    pub retry: String,
    pub dead_letter: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            main: "library-events".to_string(),
            retry: "library-events-retry".to_string(),
            dead_letter: "library-events-dlt".to_string(),
        }
    }
}

/// Which terminal handler runs when retries are exhausted. Exactly one is
/// active per deployment; persist-to-store is the canonical choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryStrategy {
    PersistToStore,
    PublishToTopic,
}

impl FromStr for RecoveryStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "persist-to-store" => Ok(RecoveryStrategy::PersistToStore),
            "publish-to-topic" => Ok(RecoveryStrategy::PublishToTopic),
            other => anyhow::bail!("unknown recovery strategy: {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub brokers: String,
    pub topics: TopicsConfig,
    pub group_id: String,
    pub retry_group_id: String,
    /// Worker tasks per consumer group.
    pub concurrency: usize,
    pub auto_offset_reset: String,
    pub backoff: BackoffPolicy,
    pub scheduler_interval: Duration,
    pub recovery_strategy: RecoveryStrategy,
    /// When unset, failure records live in memory only.
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            brokers: "127.0.0.1:9092".to_string(),
            topics: TopicsConfig::default(),
            group_id: "library-events-listener-group".to_string(),
            retry_group_id: "retry-listener-group".to_string(),
            concurrency: 3,
            auto_offset_reset: "earliest".to_string(),
            backoff: BackoffPolicy::default(),
            scheduler_interval: Duration::from_millis(10_000),
            recovery_strategy: RecoveryStrategy::PersistToStore,
            database_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backoff = BackoffPolicy {
            initial_interval: Duration::from_millis(env_parse(
                "BACKOFF_INITIAL_INTERVAL_MS",
                defaults.backoff.initial_interval.as_millis() as u64,
            )),
            multiplier: env_parse("BACKOFF_MULTIPLIER", defaults.backoff.multiplier),
            max_interval: Duration::from_millis(env_parse(
                "BACKOFF_MAX_INTERVAL_MS",
                defaults.backoff.max_interval.as_millis() as u64,
            )),
            max_retries: env_parse("BACKOFF_MAX_RETRIES", defaults.backoff.max_retries),
        };

        Self {
            brokers: env_parse("KAFKA_BROKERS", defaults.brokers),
            topics: TopicsConfig {
                main: env_parse("TOPIC_EVENTS", defaults.topics.main),
                retry: env_parse("TOPIC_RETRY", defaults.topics.retry),
                dead_letter: env_parse("TOPIC_DLT", defaults.topics.dead_letter),
            },
            group_id: env_parse("CONSUMER_GROUP", defaults.group_id),
            retry_group_id: env_parse("RETRY_CONSUMER_GROUP", defaults.retry_group_id),
            concurrency: env_parse("CONSUMER_CONCURRENCY", defaults.concurrency),
            auto_offset_reset: env_parse("AUTO_OFFSET_RESET", defaults.auto_offset_reset),
            backoff,
            scheduler_interval: Duration::from_millis(env_parse(
                "SCHEDULER_INTERVAL_MS",
                defaults.scheduler_interval.as_millis() as u64,
            )),
            recovery_strategy: env_parse("RECOVERY_STRATEGY", defaults.recovery_strategy),
            database_url: std::env::var("DATABASE_URL").ok(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable environment override, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.topics.main, "library-events");
        assert_eq!(config.topics.retry, "library-events-retry");
        assert_eq!(config.topics.dead_letter, "library-events-dlt");
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.scheduler_interval, Duration::from_millis(10_000));
        assert_eq!(config.recovery_strategy, RecoveryStrategy::PersistToStore);
    }

    #[test]
    fn recovery_strategy_parses_from_kebab_case() {
        assert_eq!(
            "persist-to-store".parse::<RecoveryStrategy>().unwrap(),
            RecoveryStrategy::PersistToStore
        );
        assert_eq!(
            "publish-to-topic".parse::<RecoveryStrategy>().unwrap(),
            RecoveryStrategy::PublishToTopic
        );
        assert!("drop".parse::<RecoveryStrategy>().is_err());
    }
}
