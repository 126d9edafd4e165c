//! Incremental per-word mention statistics
//!
//! Consumes closed `WindowedCount` records and maintains running mean and
//! standard deviation of per-window mention counts for each word. The
//! running moments use Welford's online algorithm, which stays numerically
//! stable over long streams where a naive sum-of-squares would cancel
//! catastrophically.
//!
//! Two variants sit behind the same trait: a cumulative engine that
//! aggregates over every closed window for the life of the process, and a
//! windowed engine that only considers the last K closed windows per word.
//! The pipeline behaves identically either way; callers pick via
//! [`StatsMode`].

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use trendstream_types::{WindowedCount, WordStats};

/// Running moments of a value sequence (Welford)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WelfordAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl WelfordAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one value into the running moments
    pub fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    /// Merge another accumulator into this one (Chan et al. parallel form)
    pub fn merge(&mut self, other: &WelfordAccumulator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let total = self.count + other.count;
        let delta = other.mean - self.mean;
        self.m2 += other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / total as f64;
        self.mean = (self.count as f64 * self.mean + other.count as f64 * other.mean)
            / total as f64;
        self.count = total;
    }

    /// Number of values folded in
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean; zero while empty
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance (`m2 / n`); zero while empty or at one sample
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Which statistics variant the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StatsMode {
    /// Aggregate over every closed window since process start
    Cumulative,
    /// Aggregate over only the most recent closed windows per word
    Windowed {
        /// How many closed windows to retain per word
        last_windows: usize,
    },
}

impl Default for StatsMode {
    fn default() -> Self {
        StatsMode::Cumulative
    }
}

/// Serializable snapshot of a statistics engine, used by checkpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatsSnapshot {
    /// Snapshot of [`CumulativeStats`]
    Cumulative(Vec<(String, WelfordAccumulator)>),
    /// Snapshot of [`WindowedStats`]
    Windowed {
        /// Ring capacity per word
        capacity: usize,
        /// Retained counts per word, oldest first
        rings: Vec<(String, Vec<f64>)>,
    },
}

/// Per-word statistics over closed windows
pub trait MentionStatistics: Send {
    /// Fold one closed window in and return the refreshed stats for its word
    fn update(&mut self, count: &WindowedCount) -> WordStats;

    /// Current stats for a word, if any window has closed for it
    fn stats_for(&self, word: &str) -> Option<WordStats>;

    /// Number of words currently tracked
    fn tracked_words(&self) -> usize;

    /// Snapshot state for checkpointing
    fn snapshot(&self) -> StatsSnapshot;
}

/// Build a statistics engine for the configured mode
pub fn engine_for(mode: StatsMode) -> Box<dyn MentionStatistics> {
    match mode {
        StatsMode::Cumulative => Box::new(CumulativeStats::new()),
        StatsMode::Windowed { last_windows } => Box::new(WindowedStats::new(last_windows)),
    }
}

/// Rebuild a statistics engine from a checkpoint snapshot
pub fn engine_from_snapshot(snapshot: StatsSnapshot) -> Box<dyn MentionStatistics> {
    match snapshot {
        StatsSnapshot::Cumulative(words) => Box::new(CumulativeStats {
            words: words.into_iter().collect(),
        }),
        StatsSnapshot::Windowed { capacity, rings } => Box::new(WindowedStats {
            capacity,
            rings: rings
                .into_iter()
                .map(|(word, ring)| (word, ring.into_iter().collect()))
                .collect(),
        }),
    }
}

/// Cumulative mention statistics
///
/// One Welford accumulator per word, never evicted. Unbounded accumulation
/// is accepted for the process lifetime.
#[derive(Debug, Default)]
pub struct CumulativeStats {
    words: HashMap<String, WelfordAccumulator>,
}

impl CumulativeStats {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    fn project(word: &str, acc: &WelfordAccumulator) -> WordStats {
        WordStats {
            word: word.to_string(),
            samples: acc.count(),
            avg_mentions: acc.mean(),
            std_mentions: acc.std_dev(),
        }
    }
}

impl MentionStatistics for CumulativeStats {
    fn update(&mut self, count: &WindowedCount) -> WordStats {
        let acc = self.words.entry(count.word.clone()).or_default();
        acc.update(count.total_mentions as f64);
        Self::project(&count.word, acc)
    }

    fn stats_for(&self, word: &str) -> Option<WordStats> {
        self.words.get(word).map(|acc| Self::project(word, acc))
    }

    fn tracked_words(&self) -> usize {
        self.words.len()
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut words: Vec<_> = self
            .words
            .iter()
            .map(|(word, acc)| (word.clone(), acc.clone()))
            .collect();
        words.sort_by(|a, b| a.0.cmp(&b.0));
        StatsSnapshot::Cumulative(words)
    }
}

/// Windowed mention statistics over the last K closed windows per word
///
/// Keeps a ring of retained counts and recomputes the moments from the
/// ring on each update; K is small, so the recomputation is cheaper than
/// maintaining removable running moments.
#[derive(Debug)]
pub struct WindowedStats {
    capacity: usize,
    rings: HashMap<String, VecDeque<f64>>,
}

impl WindowedStats {
    /// Create an engine retaining `capacity` windows per word
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "windowed stats capacity must be positive");
        Self {
            capacity,
            rings: HashMap::new(),
        }
    }

    fn project(word: &str, ring: &VecDeque<f64>) -> WordStats {
        let mut acc = WelfordAccumulator::new();
        for &x in ring {
            acc.update(x);
        }
        WordStats {
            word: word.to_string(),
            samples: acc.count(),
            avg_mentions: acc.mean(),
            std_mentions: acc.std_dev(),
        }
    }
}

impl MentionStatistics for WindowedStats {
    fn update(&mut self, count: &WindowedCount) -> WordStats {
        let ring = self.rings.entry(count.word.clone()).or_default();
        ring.push_back(count.total_mentions as f64);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
        Self::project(&count.word, ring)
    }

    fn stats_for(&self, word: &str) -> Option<WordStats> {
        self.rings.get(word).map(|ring| Self::project(word, ring))
    }

    fn tracked_words(&self) -> usize {
        self.rings.len()
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut rings: Vec<_> = self
            .rings
            .iter()
            .map(|(word, ring)| (word.clone(), ring.iter().copied().collect::<Vec<f64>>()))
            .collect();
        rings.sort_by(|a, b| a.0.cmp(&b.0));
        StatsSnapshot::Windowed {
            capacity: self.capacity,
            rings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use trendstream_types::Window;

    fn count(word: &str, mentions: u32) -> WindowedCount {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let end = Utc.timestamp_opt(1800, 0).unwrap();
        let ids = (0..mentions).map(|i| format!("p{}", i)).collect();
        WindowedCount::new(Window::new(start, end), word.to_string(), ids)
    }

    #[test]
    fn test_welford_known_values() {
        let mut acc = WelfordAccumulator::new();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.update(x);
        }

        assert_eq!(acc.count(), 8);
        assert!((acc.mean() - 5.0).abs() < 1e-9);
        // Population variance of this classic sequence is exactly 4.
        assert!((acc.variance() - 4.0).abs() < 1e-9);
        assert!((acc.std_dev() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_welford_single_sample_has_zero_std() {
        let mut acc = WelfordAccumulator::new();
        acc.update(42.0);

        assert_eq!(acc.count(), 1);
        assert_eq!(acc.mean(), 42.0);
        assert_eq!(acc.std_dev(), 0.0);
    }

    #[test]
    fn test_welford_permutation_convergence() {
        // Any arrival order converges to the same final moments.
        let values = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let mut forward = WelfordAccumulator::new();
        let mut backward = WelfordAccumulator::new();
        for &x in &values {
            forward.update(x);
        }
        for &x in values.iter().rev() {
            backward.update(x);
        }

        assert!((forward.mean() - backward.mean()).abs() < 1e-9);
        assert!((forward.variance() - backward.variance()).abs() < 1e-9);
    }

    #[test]
    fn test_welford_merge_matches_sequential() {
        let mut left = WelfordAccumulator::new();
        let mut right = WelfordAccumulator::new();
        let mut sequential = WelfordAccumulator::new();

        for x in [10.0, 12.0, 14.0] {
            left.update(x);
            sequential.update(x);
        }
        for x in [16.0, 18.0] {
            right.update(x);
            sequential.update(x);
        }

        left.merge(&right);
        assert_eq!(left.count(), 5);
        assert!((left.mean() - sequential.mean()).abs() < 1e-9);
        assert!((left.variance() - sequential.variance()).abs() < 1e-9);
    }

    #[test]
    fn test_welford_merge_into_empty() {
        let mut left = WelfordAccumulator::new();
        let mut right = WelfordAccumulator::new();
        right.update(5.0);
        right.update(7.0);

        left.merge(&right);
        assert_eq!(left.count(), 2);
        assert!((left.mean() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_cumulative_stats_refresh_per_window() {
        let mut engine = CumulativeStats::new();

        let first = engine.update(&count("Holidays", 2));
        assert_eq!(first.samples, 1);
        assert!((first.avg_mentions - 2.0).abs() < 1e-9);
        assert_eq!(first.std_mentions, 0.0);

        let second = engine.update(&count("Holidays", 4));
        assert_eq!(second.samples, 2);
        assert!((second.avg_mentions - 3.0).abs() < 1e-9);
        // Population std of {2, 4} is 1.
        assert!((second.std_mentions - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cumulative_stats_words_are_independent() {
        let mut engine = CumulativeStats::new();
        engine.update(&count("rust", 10));
        engine.update(&count("go", 1));

        assert_eq!(engine.tracked_words(), 2);
        assert!((engine.stats_for("rust").unwrap().avg_mentions - 10.0).abs() < 1e-9);
        assert!((engine.stats_for("go").unwrap().avg_mentions - 1.0).abs() < 1e-9);
        assert!(engine.stats_for("zig").is_none());
    }

    #[test]
    fn test_windowed_stats_evicts_old_windows() {
        let mut engine = WindowedStats::new(2);
        engine.update(&count("rust", 10));
        engine.update(&count("rust", 2));
        let stats = engine.update(&count("rust", 4));

        // Only {2, 4} retained; the 10 fell out of the ring.
        assert_eq!(stats.samples, 2);
        assert!((stats.avg_mentions - 3.0).abs() < 1e-9);
        assert!((stats.std_mentions - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_windowed_matches_cumulative_below_capacity() {
        let mut windowed = WindowedStats::new(10);
        let mut cumulative = CumulativeStats::new();

        for mentions in [1, 3, 5] {
            windowed.update(&count("rust", mentions));
            cumulative.update(&count("rust", mentions));
        }

        let w = windowed.stats_for("rust").unwrap();
        let c = cumulative.stats_for("rust").unwrap();
        assert_eq!(w.samples, c.samples);
        assert!((w.avg_mentions - c.avg_mentions).abs() < 1e-9);
        assert!((w.std_mentions - c.std_mentions).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_restore_cumulative() {
        let mut engine = CumulativeStats::new();
        engine.update(&count("rust", 2));
        engine.update(&count("rust", 4));

        let mut restored = engine_from_snapshot(engine.snapshot());
        let stats = restored.update(&count("rust", 6));
        assert_eq!(stats.samples, 3);
        assert!((stats.avg_mentions - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_restore_windowed_keeps_capacity() {
        let mut engine = WindowedStats::new(2);
        engine.update(&count("rust", 1));
        engine.update(&count("rust", 3));

        let mut restored = engine_from_snapshot(engine.snapshot());
        let stats = restored.update(&count("rust", 5));
        // Capacity survives the roundtrip: {3, 5}.
        assert_eq!(stats.samples, 2);
        assert!((stats.avg_mentions - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_engine_for_mode() {
        let mut cumulative = engine_for(StatsMode::Cumulative);
        let mut windowed = engine_for(StatsMode::Windowed { last_windows: 3 });

        cumulative.update(&count("rust", 2));
        windowed.update(&count("rust", 2));
        assert_eq!(cumulative.tracked_words(), 1);
        assert_eq!(windowed.tracked_words(), 1);
    }
}
