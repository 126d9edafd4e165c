//! Publishing stage: serialized keyed records to output sinks
//!
//! Closed window counts go to the counts topic, refreshed statistics to the
//! stats topic; in both the word travels as the message key and the value
//! carries the fixed JSON shape. Writes are retried with exponential
//! backoff up to a bounded attempt count; exhaustion fails the batch so the
//! partition offset is not advanced and redelivery can retry it.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use trendstream_types::{WindowedCount, WordStats};

use crate::error::{SinkError, SinkResult};

/// A serialized keyed record bound for an output topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    /// Message key (the word)
    pub key: String,
    /// Serialized message value
    pub value: String,
}

/// Serializes a record type into its wire shape
pub trait RecordSerializer<T>: Send + Sync {
    /// Produce the keyed wire record for one value
    fn serialize(&self, record: &T) -> SinkResult<SinkRecord>;
}

/// JSON serializer for the published record shapes
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer;

impl RecordSerializer<WindowedCount> for JsonSerializer {
    fn serialize(&self, record: &WindowedCount) -> SinkResult<SinkRecord> {
        let value = json!({
            "window": record.window,
            "ids": record.ids,
            "TotalMentions": record.total_mentions,
        });
        let value = serde_json::to_string(&value).map_err(|e| SinkError::Serialization {
            key: record.word.clone(),
            reason: e.to_string(),
        })?;
        Ok(SinkRecord {
            key: record.word.clone(),
            value,
        })
    }
}

impl RecordSerializer<WordStats> for JsonSerializer {
    fn serialize(&self, record: &WordStats) -> SinkResult<SinkRecord> {
        let value = json!({
            "avg_mentions": record.avg_mentions,
            "std_mentions": record.std_mentions,
        });
        let value = serde_json::to_string(&value).map_err(|e| SinkError::Serialization {
            key: record.word.clone(),
            reason: e.to_string(),
        })?;
        Ok(SinkRecord {
            key: record.word.clone(),
            value,
        })
    }
}

/// Destination for serialized records
#[async_trait]
pub trait Sink: Send + Sync {
    /// Write one record; a failed attempt may be retried by the publisher
    async fn write(&self, record: SinkRecord) -> SinkResult<()>;
}

/// Collecting sink backed by memory, for tests and draining runs
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub async fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, record: SinkRecord) -> SinkResult<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Line-oriented stdout sink: `<topic>\t<key>\t<value>`
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    topic: String,
}

impl ConsoleSink {
    /// Create a console sink labeled with a topic name
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into() }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn write(&self, record: SinkRecord) -> SinkResult<()> {
        println!("{}\t{}\t{}", self.topic, record.key, record.value);
        Ok(())
    }
}

/// Keyword-subscribed view of a sink
///
/// Forwards only records whose key equals the subscribed word (exact
/// match); everything else is silently skipped.
pub struct FilteredSink {
    inner: Arc<dyn Sink>,
    word: String,
}

impl FilteredSink {
    /// Wrap a sink, keeping only records keyed by `word`
    pub fn new(inner: Arc<dyn Sink>, word: impl Into<String>) -> Self {
        Self {
            inner,
            word: word.into(),
        }
    }
}

#[async_trait]
impl Sink for FilteredSink {
    async fn write(&self, record: SinkRecord) -> SinkResult<()> {
        if record.key == self.word {
            self.inner.write(record).await
        } else {
            Ok(())
        }
    }
}

/// Retry policy for publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum write attempts per record
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_backoff: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(100),
        }
    }
}

/// Publisher counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherMetrics {
    /// Records written successfully
    pub published: u64,
    /// Individual write attempts that failed and were retried
    pub retries: u64,
    /// Records abandoned after exhausting all attempts
    pub failed: u64,
}

/// Publishes pipeline outputs to the two topic sinks with bounded retries
pub struct Publisher {
    counts_sink: Arc<dyn Sink>,
    stats_sink: Arc<dyn Sink>,
    serializer: JsonSerializer,
    config: PublisherConfig,
    metrics: PublisherMetrics,
}

impl Publisher {
    /// Create a publisher over the counts (topic A) and stats (topic B)
    /// sinks
    pub fn new(
        counts_sink: Arc<dyn Sink>,
        stats_sink: Arc<dyn Sink>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            counts_sink,
            stats_sink,
            serializer: JsonSerializer,
            config,
            metrics: PublisherMetrics::default(),
        }
    }

    /// Publish one closed window count
    pub async fn publish_count(&mut self, count: &WindowedCount) -> SinkResult<()> {
        let sink = Arc::clone(&self.counts_sink);
        let record = self.serializer.serialize(count)?;
        self.write_with_retry(sink, record).await
    }

    /// Publish one refreshed statistics record
    pub async fn publish_stats(&mut self, stats: &WordStats) -> SinkResult<()> {
        let sink = Arc::clone(&self.stats_sink);
        let record = self.serializer.serialize(stats)?;
        self.write_with_retry(sink, record).await
    }

    /// Publisher counter snapshot
    pub fn metrics(&self) -> &PublisherMetrics {
        &self.metrics
    }

    async fn write_with_retry(
        &mut self,
        sink: Arc<dyn Sink>,
        record: SinkRecord,
    ) -> SinkResult<()> {
        let mut last_reason = String::new();

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                let backoff = self.config.base_backoff * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }

            match sink.write(record.clone()).await {
                Ok(()) => {
                    self.metrics.published += 1;
                    return Ok(());
                }
                Err(err) => {
                    last_reason = err.to_string();
                    self.metrics.retries += 1;
                    warn!(
                        key = %record.key,
                        attempt = attempt + 1,
                        error = %err,
                        "sink write failed"
                    );
                }
            }
        }

        self.metrics.failed += 1;
        debug!(key = %record.key, "abandoning record after retry exhaustion");
        Err(SinkError::RetriesExhausted {
            attempts: self.config.max_attempts,
            reason: last_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use trendstream_types::Window;

    fn count() -> WindowedCount {
        WindowedCount::new(
            Window::new(
                Utc.timestamp_opt(0, 0).unwrap(),
                Utc.timestamp_opt(1800, 0).unwrap(),
            ),
            "Holidays".to_string(),
            vec!["p1".to_string(), "p2".to_string()],
        )
    }

    fn stats() -> WordStats {
        WordStats {
            word: "Holidays".to_string(),
            samples: 3,
            avg_mentions: 2.0,
            std_mentions: 0.5,
        }
    }

    /// Sink that fails the first `failures` writes, then succeeds
    struct FlakySink {
        failures: u32,
        attempts: AtomicU32,
        delegate: MemorySink,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                delegate: MemorySink::new(),
            }
        }
    }

    #[async_trait]
    impl Sink for FlakySink {
        async fn write(&self, record: SinkRecord) -> SinkResult<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(SinkError::WriteFailed {
                    reason: "transient failure".to_string(),
                });
            }
            self.delegate.write(record).await
        }
    }

    fn fast_retries(max_attempts: u32) -> PublisherConfig {
        PublisherConfig {
            max_attempts,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_count_value_shape() {
        let record = JsonSerializer.serialize(&count()).unwrap();
        assert_eq!(record.key, "Holidays");

        let value: serde_json::Value = serde_json::from_str(&record.value).unwrap();
        assert_eq!(value["TotalMentions"], 2);
        assert_eq!(value["ids"], serde_json::json!(["p1", "p2"]));
        assert!(value["window"]["start"].is_string());
        assert!(value["window"]["end"].is_string());
        // The word is the message key, never part of the value.
        assert!(value.get("word").is_none());
    }

    #[test]
    fn test_stats_value_shape() {
        let record = JsonSerializer.serialize(&stats()).unwrap();
        assert_eq!(record.key, "Holidays");

        let value: serde_json::Value = serde_json::from_str(&record.value).unwrap();
        assert_eq!(value["avg_mentions"], 2.0);
        assert_eq!(value["std_mentions"], 0.5);
        assert!(value.get("samples").is_none());
    }

    #[tokio::test]
    async fn test_publisher_routes_to_topic_sinks() {
        let counts = Arc::new(MemorySink::new());
        let stats_sink = Arc::new(MemorySink::new());
        let mut publisher = Publisher::new(
            counts.clone(),
            stats_sink.clone(),
            PublisherConfig::default(),
        );

        publisher.publish_count(&count()).await.unwrap();
        publisher.publish_stats(&stats()).await.unwrap();

        assert_eq!(counts.records().await.len(), 1);
        assert_eq!(stats_sink.records().await.len(), 1);
        assert_eq!(publisher.metrics().published, 2);
    }

    #[tokio::test]
    async fn test_publisher_retries_transient_failures() {
        let flaky = Arc::new(FlakySink::new(2));
        let stats_sink = Arc::new(MemorySink::new());
        let mut publisher = Publisher::new(flaky.clone(), stats_sink, fast_retries(5));

        publisher.publish_count(&count()).await.unwrap();

        assert_eq!(flaky.delegate.records().await.len(), 1);
        assert_eq!(publisher.metrics().retries, 2);
        assert_eq!(publisher.metrics().published, 1);
    }

    #[tokio::test]
    async fn test_publisher_exhausts_retries() {
        let flaky = Arc::new(FlakySink::new(10));
        let stats_sink = Arc::new(MemorySink::new());
        let mut publisher = Publisher::new(flaky, stats_sink, fast_retries(3));

        let err = publisher.publish_count(&count()).await.unwrap_err();
        assert!(matches!(
            err,
            SinkError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(publisher.metrics().failed, 1);
    }

    #[tokio::test]
    async fn test_filtered_sink_passes_only_subscribed_word() {
        let inner = Arc::new(MemorySink::new());
        let filtered = FilteredSink::new(inner.clone(), "Holidays");

        filtered
            .write(SinkRecord {
                key: "Holidays".to_string(),
                value: "{}".to_string(),
            })
            .await
            .unwrap();
        filtered
            .write(SinkRecord {
                key: "holidays".to_string(),
                value: "{}".to_string(),
            })
            .await
            .unwrap();

        let records = inner.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "Holidays");
    }
}
