//! Stream processor for trendstream
//!
//! Turns a stream of social post events into per-word windowed mention
//! counts and rolling mention statistics. The pipeline is a chain of pure
//! stages — decode, tokenize, watermarked sliding-window aggregation,
//! incremental statistics, publishing — executed data-parallel across
//! word-hash partitions.

pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod decode;
pub mod error;
pub mod partition;
pub mod sink;
pub mod stats;
pub mod tokenize;
pub mod watermark;
pub mod window;

// Re-export commonly used types
pub use aggregate::{AggregatorMetrics, OpenWindow, WindowAggregator};
pub use checkpoint::{CheckpointStore, PartitionCheckpoint};
pub use config::{CheckpointConfig, ProcessorConfig, WatermarkConfig, WindowConfig};
pub use decode::{decode, Decoder, DecoderMetrics};
pub use error::{
    CheckpointError, ConfigError, DecodeError, PipelineError, Result as PipelineResult,
    SinkError, WindowError,
};
pub use partition::{partition_for, PipelineSummary, PipelineSupervisor, WorkerReport};
pub use sink::{
    ConsoleSink, FilteredSink, JsonSerializer, MemorySink, Publisher, PublisherConfig,
    PublisherMetrics, RecordSerializer, Sink, SinkRecord,
};
pub use stats::{
    engine_for, engine_from_snapshot, CumulativeStats, MentionStatistics, StatsMode,
    StatsSnapshot, WelfordAccumulator, WindowedStats,
};
pub use tokenize::tokenize;
pub use watermark::{merge_watermarks, WatermarkTracker};
pub use window::SlidingWindowAssigner;
