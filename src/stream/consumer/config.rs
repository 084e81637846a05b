use serde::Deserialize;
use std::time::Duration;

use crate::stream::error::{Error, Result};

/// Configuration for a stream consumer
///
/// Immutable once handed to [`Consumer::new`](super::Consumer::new).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Stream to consume from
    pub stream_key: String,

    /// Consumer group name
    pub consumer_group: String,

    /// Prefix of the consumer identity (`<prefix>-<hostname>-<pid>`)
    pub consumer_id_prefix: String,

    /// Maximum records per read
    pub batch_size: usize,

    /// How long a read waits for new records
    #[serde(with = "humantime_serde")]
    pub block_time: Duration,

    /// Consecutive failed passes before the loop gives up; also the delivery
    /// count above which a peer's pending entry is reclaimed
    pub max_retries: u32,

    /// Base delay between retries, multiplied by the retry count
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Idle time after which a peer's pending entry may be reclaimed
    #[serde(with = "humantime_serde")]
    pub min_idle: Duration,

    /// Capacity of the output channel of decoded events
    pub channel_capacity: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_key: String::new(),
            consumer_group: String::new(),
            consumer_id_prefix: String::new(),
            batch_size: 10,
            block_time: Duration::from_secs(5),
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
            min_idle: Duration::from_secs(10),
            channel_capacity: 100,
        }
    }
}

impl ConsumerConfig {
    /// Create a new consumer configuration
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use streamgroup::stream::consumer::ConsumerConfig;
    ///
    /// let config = ConsumerConfig::new("stats:events", "stats-service", "stats-consumer")
    ///     .with_batch_size(10)
    ///     .with_block_time(Duration::from_secs(5))
    ///     .with_max_retries(5)
    ///     .with_retry_delay(Duration::from_secs(2))
    ///     .with_min_idle(Duration::from_secs(10));
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn new(
        stream_key: impl Into<String>,
        consumer_group: impl Into<String>,
        consumer_id_prefix: impl Into<String>,
    ) -> Self {
        Self {
            stream_key: stream_key.into(),
            consumer_group: consumer_group.into(),
            consumer_id_prefix: consumer_id_prefix.into(),
            ..Default::default()
        }
    }

    /// Set the batch size (builder pattern)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the read block time (builder pattern)
    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    /// Set the maximum retries (builder pattern)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the retry delay (builder pattern)
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the reclaim idle threshold (builder pattern)
    pub fn with_min_idle(mut self, min_idle: Duration) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set the output channel capacity (builder pattern)
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Load a configuration from environment variables
    ///
    /// Reads `<PREFIX>_STREAM_KEY`, `<PREFIX>_CONSUMER_GROUP`, `<PREFIX>_CONSUMER_ID_PREFIX`,
    /// `<PREFIX>_BATCH_SIZE`, `<PREFIX>_BLOCK_TIME`, `<PREFIX>_MAX_RETRIES`,
    /// `<PREFIX>_RETRY_DELAY`, `<PREFIX>_MIN_IDLE` and `<PREFIX>_CHANNEL_CAPACITY`.
    /// Unset variables keep the values of `base`. Durations accept humantime strings
    /// (`"1m 30s"`) or whole seconds (`"90"`).
    pub fn from_env(prefix: &str, base: ConsumerConfig) -> Result<Self> {
        Self::from_lookup(prefix, base, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(prefix: &str, base: ConsumerConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}_{}", prefix, name));
        let mut config = base;

        if let Some(v) = get("STREAM_KEY") {
            config.stream_key = v;
        }
        if let Some(v) = get("CONSUMER_GROUP") {
            config.consumer_group = v;
        }
        if let Some(v) = get("CONSUMER_ID_PREFIX") {
            config.consumer_id_prefix = v;
        }
        if let Some(v) = get("BATCH_SIZE") {
            config.batch_size = parse_number("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("BLOCK_TIME") {
            config.block_time = parse_duration("BLOCK_TIME", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            config.max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_DELAY") {
            config.retry_delay = parse_duration("RETRY_DELAY", &v)?;
        }
        if let Some(v) = get("MIN_IDLE") {
            config.min_idle = parse_duration("MIN_IDLE", &v)?;
        }
        if let Some(v) = get("CHANNEL_CAPACITY") {
            config.channel_capacity = parse_number("CHANNEL_CAPACITY", &v)?;
        }

        Ok(config)
    }

    /// Check the configuration can drive a consumer
    pub fn validate(&self) -> Result<()> {
        if self.stream_key.is_empty() {
            return Err(Error::ConfigError("stream_key must not be empty".to_string()));
        }
        if self.consumer_group.is_empty() {
            return Err(Error::ConfigError("consumer_group must not be empty".to_string()));
        }
        if self.consumer_id_prefix.is_empty() {
            return Err(Error::ConfigError(
                "consumer_id_prefix must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::ConfigError("batch_size must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::ConfigError("max_retries must be at least 1".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::ConfigError(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::ConfigError(format!("{} is not a valid number: '{}'", name, value)))
}

fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value)
        .map_err(|e| Error::ConfigError(format!("{} is not a valid duration: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_consumer_config_builder() {
        let config = ConsumerConfig::new("log", "logging-group", "logging-consumer")
            .with_batch_size(100)
            .with_block_time(Duration::from_secs(3))
            .with_max_retries(3)
            .with_retry_delay(Duration::from_secs(5))
            .with_min_idle(Duration::from_secs(300))
            .with_channel_capacity(50);

        assert_eq!(config.stream_key, "log");
        assert_eq!(config.consumer_group, "logging-group");
        assert_eq!(config.consumer_id_prefix, "logging-consumer");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.block_time, Duration::from_secs(3));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.min_idle, Duration::from_secs(300));
        assert_eq!(config.channel_capacity, 50);
    }

    #[test]
    fn test_defaults() {
        let config = ConsumerConfig::new("s", "g", "p");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.block_time, Duration::from_secs(5));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.min_idle, Duration::from_secs(10));
        assert_eq!(config.channel_capacity, 100);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let ok = ConsumerConfig::new("s", "g", "p");
        assert!(ok.validate().is_ok());

        assert!(ConsumerConfig::new("", "g", "p").validate().is_err());
        assert!(ConsumerConfig::new("s", "", "p").validate().is_err());
        assert!(ConsumerConfig::new("s", "g", "").validate().is_err());
        assert!(ok.clone().with_batch_size(0).validate().is_err());
        assert!(ok.clone().with_max_retries(0).validate().is_err());
        assert!(ok.with_channel_capacity(0).validate().is_err());
    }

    #[test]
    fn test_from_lookup_overrides_and_keeps_defaults() {
        let base = ConsumerConfig::new("log", "logging-group", "logging-consumer");
        let config = ConsumerConfig::from_lookup(
            "LOGGING",
            base,
            lookup(&[
                ("LOGGING_CONSUMER_GROUP", "other-group"),
                ("LOGGING_MAX_RETRIES", "7"),
                ("LOGGING_RETRY_DELAY", "3"),
                ("LOGGING_BLOCK_TIME", "250ms"),
                ("LOGGING_MIN_IDLE", "5m"),
            ]),
        )
        .unwrap();

        assert_eq!(config.stream_key, "log");
        assert_eq!(config.consumer_group, "other-group");
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.retry_delay, Duration::from_secs(3));
        assert_eq!(config.block_time, Duration::from_millis(250));
        assert_eq!(config.min_idle, Duration::from_secs(300));
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let base = ConsumerConfig::new("s", "g", "p");
        let err = ConsumerConfig::from_lookup("X", base, lookup(&[("X_BATCH_SIZE", "many")]))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let json = r#"{
            "stream_key": "stats:events",
            "consumer_group": "stats-service",
            "consumer_id_prefix": "stats-consumer",
            "block_time": "5s",
            "retry_delay": "2s",
            "min_idle": "10s"
        }"#;
        let config: ConsumerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.stream_key, "stats:events");
        assert_eq!(config.block_time, Duration::from_secs(5));
        assert_eq!(config.min_idle, Duration::from_secs(10));
        assert_eq!(config.batch_size, 10);
    }
}
