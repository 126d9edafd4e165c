//! Output record types
//!
//! Windows and the two emitted record kinds: per-window mention counts
//! (topic A) and per-word rolling statistics (topic B). These types define
//! the value shapes of the published messages; the word itself travels as
//! the message key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open event-time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Start of the window (inclusive)
    pub start: DateTime<Utc>,
    /// End of the window (exclusive)
    pub end: DateTime<Utc>,
}

impl Window {
    /// Create a new window
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start < end, "window start must be before end");
        Self { start, end }
    }

    /// Check whether a timestamp falls within this window
    ///
    /// Half-open law: `start` is in, `end` is not.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Length of the window
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl PartialOrd for Window {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Window {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {})",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Snapshot of a closed window for one word
///
/// Emitted exactly once, at the moment the watermark passes the window end.
/// `ids` preserves arrival order; duplicates were collapsed on insert, so
/// `total_mentions == ids.len()` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedCount {
    /// The closed window
    pub window: Window,
    /// The counted word (message key on the wire)
    pub word: String,
    /// Distinct contributing post ids, in arrival order
    pub ids: Vec<String>,
    /// Number of distinct posts mentioning the word in this window
    #[serde(rename = "TotalMentions")]
    pub total_mentions: u32,
}

impl WindowedCount {
    /// Build a count record from a window's accumulated post ids
    pub fn new(window: Window, word: String, ids: Vec<String>) -> Self {
        let total_mentions = ids.len() as u32;
        Self {
            window,
            word,
            ids,
            total_mentions,
        }
    }
}

/// Rolling mention statistics for one word
///
/// Derived projections of the Welford accumulator feeding them; refreshed
/// on every closed window for the word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordStats {
    /// The word (message key on the wire)
    pub word: String,
    /// Number of closed windows observed for this word
    pub samples: u64,
    /// Mean of per-window mention counts
    pub avg_mentions: f64,
    /// Population standard deviation of per-window mention counts
    pub std_mentions: f64,
}
