//! Watermark tracking for late-data handling
//!
//! A watermark is a lower bound on event time below which no further data
//! is expected. Each partition tracks its own watermark as
//! `max(event time seen) - allowed lateness`; it only ever moves forward.
//! Events older than the watermark on arrival are late and get dropped by
//! the aggregator. The global watermark across partitions is the minimum of
//! the per-partition watermarks, so a fast partition never violates a slow
//! sibling's lateness tolerance.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Per-partition watermark tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkTracker {
    #[serde(with = "duration_secs")]
    allowed_lateness: Duration,
    max_event_time: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
}

impl WatermarkTracker {
    /// Create a tracker with the given lateness tolerance
    pub fn new(allowed_lateness: Duration) -> Self {
        assert!(
            allowed_lateness >= Duration::zero(),
            "allowed lateness must be non-negative"
        );
        Self {
            allowed_lateness,
            max_event_time: None,
            current: None,
        }
    }

    /// Recreate a tracker from a checkpointed watermark
    pub fn restore(allowed_lateness: Duration, watermark: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed_lateness,
            max_event_time: watermark.map(|w| w + allowed_lateness),
            current: watermark,
        }
    }

    /// The lateness tolerance this tracker was built with
    pub fn allowed_lateness(&self) -> Duration {
        self.allowed_lateness
    }

    /// Current watermark; `None` until the first event is observed
    pub fn current(&self) -> Option<DateTime<Utc>> {
        self.current
    }

    /// Check whether an event is late relative to the current watermark
    pub fn is_late(&self, event_time: DateTime<Utc>) -> bool {
        match self.current {
            Some(watermark) => event_time < watermark,
            None => false,
        }
    }

    /// How far behind the watermark an event is; zero when not late
    pub fn lateness(&self, event_time: DateTime<Utc>) -> Duration {
        match self.current {
            Some(watermark) if event_time < watermark => watermark - event_time,
            _ => Duration::zero(),
        }
    }

    /// Observe an event time, advancing the watermark if it moved forward
    ///
    /// Returns the new watermark when it advanced. Out-of-order events
    /// below the running maximum never move the watermark backwards.
    pub fn observe(&mut self, event_time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let advanced = match self.max_event_time {
            Some(max) if event_time <= max => false,
            _ => {
                self.max_event_time = Some(event_time);
                true
            }
        };

        if !advanced {
            return None;
        }

        let candidate = event_time - self.allowed_lateness;
        match self.current {
            Some(current) if candidate <= current => None,
            _ => {
                self.current = Some(candidate);
                self.current
            }
        }
    }
}

/// Merge per-partition watermarks into the global watermark
///
/// The global watermark is the minimum over partitions that have observed
/// data; `None` while no partition has one yet.
pub fn merge_watermarks<I>(watermarks: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = Option<DateTime<Utc>>>,
{
    watermarks.into_iter().flatten().min()
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        Ok(Duration::seconds(secs))
    }
}
