//! Watermarked sliding-window mention aggregation
//!
//! The aggregator owns the keyed window state for one partition: a map from
//! `(word, window)` to the set of post ids seen so far. Windows are created
//! lazily on the first mention landing in them, mutated by idempotent
//! post-id upserts, and closed (emitted, then discarded) as soon as the
//! partition watermark passes their end. A window closes at most once;
//! data arriving after its close is dropped with no retroactive
//! correction.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use trendstream_types::{Window, WindowedCount, WordMention};

use crate::watermark::WatermarkTracker;
use crate::window::SlidingWindowAssigner;

/// Counters for one partition's aggregation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorMetrics {
    /// Mentions accepted into at least one window
    pub mentions_processed: u64,
    /// Mentions dropped because they arrived behind the watermark
    pub late_dropped: u64,
    /// Windows materialized
    pub windows_created: u64,
    /// Windows closed and emitted
    pub windows_closed: u64,
}

/// Accumulating state of one open window
///
/// Post ids are kept in arrival order; the side set makes re-delivered ids
/// a no-op so replays upsert instead of double-counting.
#[derive(Debug, Clone, Default)]
struct WindowState {
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl WindowState {
    fn upsert(&mut self, post_id: &str) -> bool {
        if self.seen.contains(post_id) {
            return false;
        }
        self.seen.insert(post_id.to_string());
        self.ids.push(post_id.to_string());
        true
    }

    fn into_ids(self) -> Vec<String> {
        self.ids
    }
}

/// Serializable snapshot of one open window, used by checkpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenWindow {
    /// The word being counted
    pub word: String,
    /// The open window
    pub window: Window,
    /// Post ids collected so far, in arrival order
    pub ids: Vec<String>,
}

/// Sliding-window aggregator for one partition
#[derive(Debug)]
pub struct WindowAggregator {
    assigner: SlidingWindowAssigner,
    watermark: WatermarkTracker,
    // Keyed window state; BTreeMap keeps close emission deterministic and
    // window-start ordered within each word.
    windows: BTreeMap<(String, Window), WindowState>,
    metrics: AggregatorMetrics,
}

impl WindowAggregator {
    /// Create an aggregator with the given assigner and watermark tracker
    pub fn new(assigner: SlidingWindowAssigner, watermark: WatermarkTracker) -> Self {
        Self {
            assigner,
            watermark,
            windows: BTreeMap::new(),
            metrics: AggregatorMetrics::default(),
        }
    }

    /// Process one mention, returning any windows its arrival closed
    ///
    /// Steps: drop if late, upsert into every containing window, advance
    /// the watermark, then sweep out windows whose end the watermark has
    /// passed. An event never closes a window it just joined: its own
    /// windows end after `event_time`, which stays ahead of the watermark
    /// the event produces.
    pub fn on_mention(&mut self, mention: &WordMention) -> Vec<WindowedCount> {
        if self.watermark.is_late(mention.event_time) {
            self.metrics.late_dropped += 1;
            debug!(
                word = %mention.word,
                post_id = %mention.post_id,
                event_time = %mention.event_time,
                lateness_secs = self.watermark.lateness(mention.event_time).num_seconds(),
                "dropping late mention"
            );
            return Vec::new();
        }

        for window in self.assigner.assign(mention.event_time) {
            let state = self
                .windows
                .entry((mention.word.clone(), window))
                .or_insert_with(|| {
                    trace!(word = %mention.word, %window, "materializing window");
                    WindowState::default()
                });
            if state.seen.is_empty() {
                self.metrics.windows_created += 1;
            }
            state.upsert(&mention.post_id);
        }
        self.metrics.mentions_processed += 1;

        match self.watermark.observe(mention.event_time) {
            Some(watermark) => self.close_ripe_windows(watermark),
            None => Vec::new(),
        }
    }

    /// Close every window whose end the watermark has passed
    fn close_ripe_windows(&mut self, watermark: DateTime<Utc>) -> Vec<WindowedCount> {
        let ripe: Vec<(String, Window)> = self
            .windows
            .keys()
            .filter(|(_, window)| window.end <= watermark)
            .cloned()
            .collect();

        let mut closed = Vec::with_capacity(ripe.len());
        for key in ripe {
            if let Some(state) = self.windows.remove(&key) {
                let (word, window) = key;
                let count = WindowedCount::new(window, word, state.into_ids());
                debug!(
                    word = %count.word,
                    window = %count.window,
                    total_mentions = count.total_mentions,
                    "closing window"
                );
                self.metrics.windows_closed += 1;
                closed.push(count);
            }
        }
        closed
    }

    /// Force-close every remaining open window regardless of watermark
    ///
    /// Used when a bounded input stream ends and no further events will
    /// advance the watermark. Not part of normal streaming operation.
    pub fn flush(&mut self) -> Vec<WindowedCount> {
        let keys: Vec<(String, Window)> = self.windows.keys().cloned().collect();
        let mut closed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(state) = self.windows.remove(&key) {
                let (word, window) = key;
                self.metrics.windows_closed += 1;
                closed.push(WindowedCount::new(window, word, state.into_ids()));
            }
        }
        closed
    }

    /// Current partition watermark
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark.current()
    }

    /// Number of currently open windows
    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }

    /// Counter snapshot
    pub fn metrics(&self) -> &AggregatorMetrics {
        &self.metrics
    }

    /// Snapshot open state for checkpointing
    pub fn snapshot(&self) -> Vec<OpenWindow> {
        self.windows
            .iter()
            .map(|((word, window), state)| OpenWindow {
                word: word.clone(),
                window: *window,
                ids: state.ids.clone(),
            })
            .collect()
    }

    /// Rebuild an aggregator from checkpointed state
    pub fn restore(
        assigner: SlidingWindowAssigner,
        watermark: WatermarkTracker,
        open_windows: Vec<OpenWindow>,
    ) -> Self {
        let mut windows = BTreeMap::new();
        for open in open_windows {
            let mut state = WindowState::default();
            for id in open.ids {
                state.upsert(&id);
            }
            windows.insert((open.word, open.window), state);
        }
        Self {
            assigner,
            watermark,
            windows,
            metrics: AggregatorMetrics::default(),
        }
    }
}
