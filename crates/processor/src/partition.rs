//! Partitioned pipeline execution
//!
//! Events are data-parallel by word hash: each partition is a sequential
//! tokio task that exclusively owns its window state, watermark tracker and
//! statistics engine, so no locks guard the hot path. The supervisor owns
//! the workers: it decodes and tokenizes incoming records, routes mentions
//! to partitions over bounded channels (backpressure), exposes the global
//! minimum watermark, and orders checkpoint-then-stop on shutdown.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use trendstream_types::{PostEvent, WordMention};

use crate::aggregate::{AggregatorMetrics, WindowAggregator};
use crate::checkpoint::{CheckpointStore, PartitionCheckpoint};
use crate::config::ProcessorConfig;
use crate::decode::{Decoder, DecoderMetrics};
use crate::error::{PipelineError, Result};
use crate::sink::{Publisher, PublisherMetrics, Sink};
use crate::stats::{engine_for, engine_from_snapshot, MentionStatistics};
use crate::tokenize::tokenize;
use crate::watermark::{merge_watermarks, WatermarkTracker};
use crate::window::SlidingWindowAssigner;

/// Route a word to its owning partition
pub fn partition_for(word: &str, partitions: usize) -> u32 {
    let mut hasher = DefaultHasher::new();
    word.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as u32
}

/// Commands routed to partition workers
enum WorkerCommand {
    /// Process one mention read at the given input offset
    Mention { mention: WordMention, offset: u64 },
    /// Persist a checkpoint now
    Checkpoint,
    /// Force-close all open windows (bounded-input runs only)
    Flush,
}

/// Final counters reported by a partition worker on shutdown
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Partition id
    pub partition: u32,
    /// Aggregation counters
    pub aggregation: AggregatorMetrics,
    /// Publishing counters
    pub publishing: PublisherMetrics,
    /// Highest input offset folded in
    pub last_offset: Option<u64>,
}

/// Aggregated result of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    /// Decoder dead-letter counters
    pub decoder: DecoderMetrics,
    /// Per-partition worker reports
    pub workers: Vec<WorkerReport>,
}

impl PipelineSummary {
    /// Mentions accepted across all partitions
    pub fn mentions_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.aggregation.mentions_processed).sum()
    }

    /// Late mentions dropped across all partitions
    pub fn late_dropped(&self) -> u64 {
        self.workers.iter().map(|w| w.aggregation.late_dropped).sum()
    }

    /// Windows closed across all partitions
    pub fn windows_closed(&self) -> u64 {
        self.workers.iter().map(|w| w.aggregation.windows_closed).sum()
    }

    /// Records published across all partitions
    pub fn records_published(&self) -> u64 {
        self.workers.iter().map(|w| w.publishing.published).sum()
    }
}

/// Sequential worker owning one partition's state
struct PartitionWorker {
    partition: u32,
    aggregator: WindowAggregator,
    stats: Box<dyn MentionStatistics>,
    publisher: Publisher,
    store: CheckpointStore,
    watermarks: Arc<DashMap<u32, DateTime<Utc>>>,
    last_offset: Option<u64>,
}

impl PartitionWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<WorkerCommand>) -> Result<WorkerReport> {
        while let Some(command) = rx.recv().await {
            match command {
                WorkerCommand::Mention { mention, offset } => {
                    self.handle_mention(mention, offset).await?;
                }
                WorkerCommand::Checkpoint => {
                    self.checkpoint().await?;
                }
                WorkerCommand::Flush => {
                    self.flush_open().await?;
                }
            }
        }

        // Channel closed: graceful shutdown. In-flight commands were
        // drained by the loop above; persist state, then stop.
        self.checkpoint().await?;
        info!(partition = self.partition, "worker stopped");
        Ok(WorkerReport {
            partition: self.partition,
            aggregation: self.aggregator.metrics().clone(),
            publishing: self.publisher.metrics().clone(),
            last_offset: self.last_offset,
        })
    }

    async fn handle_mention(&mut self, mention: WordMention, offset: u64) -> Result<()> {
        let closed = self.aggregator.on_mention(&mention);

        if let Some(watermark) = self.aggregator.watermark() {
            self.watermarks.insert(self.partition, watermark);
        }

        for count in &closed {
            self.publisher.publish_count(count).await?;
            let stats = self.stats.update(count);
            self.publisher.publish_stats(&stats).await?;
        }

        // The offset only advances once every emission for this input
        // succeeded; a failed batch is redelivered after restart.
        self.last_offset = Some(self.last_offset.map_or(offset, |o| o.max(offset)));
        Ok(())
    }

    async fn flush_open(&mut self) -> Result<()> {
        let closed = self.aggregator.flush();
        debug!(
            partition = self.partition,
            windows = closed.len(),
            "flushing open windows"
        );
        for count in &closed {
            self.publisher.publish_count(count).await?;
            let stats = self.stats.update(count);
            self.publisher.publish_stats(&stats).await?;
        }
        Ok(())
    }

    async fn checkpoint(&mut self) -> Result<()> {
        let checkpoint = PartitionCheckpoint {
            partition: self.partition,
            created_at: Utc::now(),
            watermark: self.aggregator.watermark(),
            offset: self.last_offset,
            open_windows: self.aggregator.snapshot(),
            stats: self.stats.snapshot(),
        };
        self.store.save(&checkpoint).await?;
        Ok(())
    }
}

/// Owns the partition workers and routes the input stream to them
pub struct PipelineSupervisor {
    config: ProcessorConfig,
    decoder: Decoder,
    senders: Vec<mpsc::Sender<WorkerCommand>>,
    handles: Vec<JoinHandle<Result<WorkerReport>>>,
    watermarks: Arc<DashMap<u32, DateTime<Utc>>>,
    checkpoint_ticker: JoinHandle<()>,
}

impl PipelineSupervisor {
    /// Validate configuration, restore any checkpointed state and spawn
    /// one worker per partition
    pub async fn start(
        config: ProcessorConfig,
        counts_sink: Arc<dyn Sink>,
        stats_sink: Arc<dyn Sink>,
    ) -> Result<Self> {
        config.validate()?;

        let store = CheckpointStore::new(&config.checkpoint.dir, config.checkpoint.max_retained);
        let watermarks: Arc<DashMap<u32, DateTime<Utc>>> = Arc::new(DashMap::new());

        let mut senders = Vec::with_capacity(config.partitions);
        let mut handles = Vec::with_capacity(config.partitions);

        for partition in 0..config.partitions as u32 {
            let assigner =
                SlidingWindowAssigner::new(config.window_size(), config.window_hop());

            // Checkpoint corruption with no valid fallback is fatal for
            // this partition, which here means failing startup loudly.
            let restored = store.load_latest(partition).await?;
            let (aggregator, stats) = match restored {
                Some(checkpoint) => {
                    info!(
                        partition,
                        watermark = ?checkpoint.watermark,
                        open_windows = checkpoint.open_windows.len(),
                        "resuming partition from checkpoint"
                    );
                    if let Some(watermark) = checkpoint.watermark {
                        watermarks.insert(partition, watermark);
                    }
                    let tracker = WatermarkTracker::restore(
                        config.allowed_lateness(),
                        checkpoint.watermark,
                    );
                    (
                        WindowAggregator::restore(assigner, tracker, checkpoint.open_windows),
                        engine_from_snapshot(checkpoint.stats),
                    )
                }
                None => (
                    WindowAggregator::new(
                        assigner,
                        WatermarkTracker::new(config.allowed_lateness()),
                    ),
                    engine_for(config.stats),
                ),
            };

            let worker = PartitionWorker {
                partition,
                aggregator,
                stats,
                publisher: Publisher::new(
                    Arc::clone(&counts_sink),
                    Arc::clone(&stats_sink),
                    config.publisher_config(),
                ),
                store: store.clone(),
                watermarks: Arc::clone(&watermarks),
                last_offset: None,
            };

            let (tx, rx) = mpsc::channel(config.channel_capacity);
            senders.push(tx);
            handles.push(tokio::spawn(worker.run(rx)));
        }

        let checkpoint_ticker = Self::spawn_checkpoint_ticker(
            senders.clone(),
            std::time::Duration::from_secs(config.checkpoint.interval_secs),
        );

        info!(partitions = config.partitions, "pipeline started");
        Ok(Self {
            config,
            decoder: Decoder::new(),
            senders,
            handles,
            watermarks,
            checkpoint_ticker,
        })
    }

    /// Periodically ask every worker to checkpoint
    fn spawn_checkpoint_ticker(
        senders: Vec<mpsc::Sender<WorkerCommand>>,
        interval: std::time::Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                debug!("periodic checkpoint");
                for sender in &senders {
                    if sender.send(WorkerCommand::Checkpoint).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    /// Decode and ingest one raw record
    ///
    /// Returns `true` when the record was decoded and routed; a record
    /// that fails decoding is dead-lettered (counted, logged) and the
    /// pipeline moves on.
    pub async fn ingest_raw(&mut self, raw: &[u8], offset: u64) -> Result<bool> {
        match self.decoder.decode(raw) {
            Ok(event) => {
                self.ingest_event(event, offset).await?;
                Ok(true)
            }
            Err(err) => {
                warn!(offset, error = %err, "dead-lettering undecodable record");
                Ok(false)
            }
        }
    }

    /// Tokenize one decoded event and route its mentions to partitions
    pub async fn ingest_event(&mut self, event: PostEvent, offset: u64) -> Result<()> {
        for mention in tokenize(&event) {
            let partition = partition_for(&mention.word, self.config.partitions);
            self.senders[partition as usize]
                .send(WorkerCommand::Mention { mention, offset })
                .await
                .map_err(|_| worker_gone(partition))?;
        }
        Ok(())
    }

    /// Global watermark: the minimum across partitions that have one
    pub fn global_watermark(&self) -> Option<DateTime<Utc>> {
        merge_watermarks(self.watermarks.iter().map(|entry| Some(*entry.value())))
    }

    /// Ask every worker to persist a checkpoint
    pub async fn checkpoint(&self) -> Result<()> {
        for (partition, sender) in self.senders.iter().enumerate() {
            sender
                .send(WorkerCommand::Checkpoint)
                .await
                .map_err(|_| worker_gone(partition as u32))?;
        }
        Ok(())
    }

    /// Force-close all open windows across partitions
    ///
    /// Only meaningful for bounded input, where no further event will
    /// advance the watermarks past the trailing windows.
    pub async fn flush_open(&self) -> Result<()> {
        for (partition, sender) in self.senders.iter().enumerate() {
            sender
                .send(WorkerCommand::Flush)
                .await
                .map_err(|_| worker_gone(partition as u32))?;
        }
        Ok(())
    }

    /// Decoder dead-letter counters
    pub fn decoder_metrics(&self) -> &DecoderMetrics {
        self.decoder.metrics()
    }

    /// Graceful shutdown: drain every worker, checkpoint, and collect
    /// the final reports
    pub async fn shutdown(self) -> Result<PipelineSummary> {
        // The ticker holds sender clones; stop it first so dropping ours
        // actually closes the channels.
        self.checkpoint_ticker.abort();
        let _ = self.checkpoint_ticker.await;

        // Closing the channels lets each worker drain its queue, take a
        // final checkpoint and stop.
        drop(self.senders);

        let mut workers = Vec::with_capacity(self.handles.len());
        for (partition, handle) in self.handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(report)) => workers.push(report),
                Ok(Err(err)) => {
                    error!(partition, error = %err, "worker failed during shutdown");
                    return Err(err);
                }
                Err(join_err) => {
                    error!(partition, error = %join_err, "worker panicked");
                    return Err(worker_gone(partition as u32));
                }
            }
        }

        workers.sort_by_key(|w| w.partition);
        Ok(PipelineSummary {
            decoder: self.decoder.metrics().clone(),
            workers,
        })
    }
}

fn worker_gone(partition: u32) -> PipelineError {
    PipelineError::WorkerFailed {
        partition,
        reason: "worker task terminated".to_string(),
    }
}
