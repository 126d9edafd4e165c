//! Sliding window assignment
//!
//! Maps an event timestamp to every half-open window `[start, start+size)`
//! that contains it. Windows start on hop boundaries; with size L and hop H
//! a timestamp lands in up to `ceil(L/H)` concurrent windows. An event
//! exactly on a boundary belongs to the window starting there, never the
//! one ending there.

use chrono::{DateTime, Duration, TimeZone, Utc};
use trendstream_types::Window;

/// Assigns timestamps to overlapping fixed-size windows
#[derive(Debug, Clone)]
pub struct SlidingWindowAssigner {
    size: Duration,
    hop: Duration,
}

impl SlidingWindowAssigner {
    /// Create a new sliding window assigner
    pub fn new(size: Duration, hop: Duration) -> Self {
        assert!(size > Duration::zero(), "window size must be positive");
        assert!(hop > Duration::zero(), "hop must be positive");
        assert!(hop <= size, "hop must not exceed window size");
        Self { size, hop }
    }

    /// Window length
    pub fn size(&self) -> Duration {
        self.size
    }

    /// Hop between consecutive window starts
    pub fn hop(&self) -> Duration {
        self.hop
    }

    /// Maximum number of windows a single event can land in
    pub fn max_windows_per_event(&self) -> usize {
        let size = self.size.num_milliseconds();
        let hop = self.hop.num_milliseconds();
        ((size + hop - 1) / hop) as usize
    }

    /// All windows containing `timestamp`, oldest first
    ///
    /// The newest candidate start is `floor(t/H)*H`; earlier hops are
    /// included while the timestamp still falls inside their span.
    pub fn assign(&self, timestamp: DateTime<Utc>) -> Vec<Window> {
        let ts = timestamp.timestamp_millis();
        let size = self.size.num_milliseconds();
        let hop = self.hop.num_milliseconds();

        let newest_start = ts.div_euclid(hop) * hop;

        let mut windows = Vec::with_capacity(self.max_windows_per_event());
        let mut start = newest_start;
        while start + size > ts {
            windows.push(Window::new(millis(start), millis(start + size)));
            start -= hop;
        }
        windows.reverse();
        windows
    }
}

fn millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}
