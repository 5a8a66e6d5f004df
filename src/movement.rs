//! Bounded movement-event history
//!
//! The sleep monitor appends a timestamp whenever consecutive samples show
//! a significant magnitude change, and asks windowed questions about the
//! recent past ("how many movements in the last 2 hours?"). Records older
//! than the retention horizon are purged on every tick, so the log stays
//! bounded regardless of uptime.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Append-only, time-ordered movement timestamps with bounded retention.
///
/// Insertion order is chronological (samples arrive in order); duplicate
/// timestamps are allowed.
#[derive(Debug, Clone)]
pub struct MovementLog {
    retention: Duration,
    records: VecDeque<DateTime<Utc>>,
}

impl MovementLog {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            records: VecDeque::new(),
        }
    }

    /// Append a movement at the given instant.
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.records.push_back(at);
    }

    /// Drop every record at or past the retention horizon.
    pub fn purge(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        while let Some(front) = self.records.front() {
            if *front <= cutoff {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records with `timestamp >= now - window`.
    pub fn count_in_window(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        self.records.iter().filter(|t| **t >= cutoff).count()
    }

    /// Earliest record with `timestamp >= cutoff`, if any.
    pub fn earliest_since(&self, cutoff: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.records.iter().find(|t| **t >= cutoff).copied()
    }

    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.records.front().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Fraction of `window` the log actually spans, clamped to `[0, 1]`.
    ///
    /// Zero when the log is empty. A young log covering only a sliver of
    /// the window yields a value near zero even if it holds many records.
    pub fn coverage(&self, now: DateTime<Utc>, window: Duration) -> f64 {
        let Some(oldest) = self.oldest() else {
            return 0.0;
        };
        let window_ms = window.num_milliseconds() as f64;
        if window_ms <= 0.0 {
            return 0.0;
        }
        let span_ms = (now - oldest).num_milliseconds() as f64;
        (span_ms / window_ms).clamp(0.0, 1.0)
    }

    /// Movement rate over `window`, in events per hour.
    ///
    /// Returns `None` when the log is empty or covers less than
    /// `min_coverage` of the window. "Not enough history" is a distinct
    /// outcome from "low movement" and callers must not conflate them.
    pub fn rate_per_hour(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        min_coverage: f64,
    ) -> Option<f64> {
        if self.is_empty() || self.coverage(now, window) < min_coverage {
            return None;
        }
        let hours = window.num_milliseconds() as f64 / 3_600_000.0;
        if hours <= 0.0 {
            return None;
        }
        Some(self.count_in_window(now, window) as f64 / hours)
    }
}
