//! Step detection over the accelerometer stream
//!
//! A double-threshold debounce peak detector: a step is an acceleration
//! magnitude change large enough to be a footstep impulse, no sooner than
//! a minimum interval after the previous counted step. It accepts some
//! under/over-counting instead of modeling the full gait cycle.

use chrono::{DateTime, Duration, Utc};

use crate::types::MotionSample;

/// Tuning for the step detector.
#[derive(Debug, Clone)]
pub struct StepConfig {
    /// Minimum magnitude change between consecutive samples to qualify as
    /// a footstep impulse (g)
    pub step_threshold: f64,
    /// Minimum time between counted steps
    pub min_step_interval: Duration,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            step_threshold: 0.8,
            min_step_interval: Duration::milliseconds(200), // max ~5 steps/sec
        }
    }
}

/// Stateful per-sample step counter.
#[derive(Debug, Clone)]
pub struct StepDetector {
    config: StepConfig,
    last_magnitude: Option<f64>,
    last_step_at: Option<DateTime<Utc>>,
    steps: u32,
}

impl StepDetector {
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            last_magnitude: None,
            last_step_at: None,
            steps: 0,
        }
    }

    /// Consume one sample; returns whether a step was counted.
    ///
    /// The first sample only primes the magnitude cell. The magnitude cell
    /// is always updated, whether or not a step fires.
    pub fn process(&mut self, sample: &MotionSample) -> bool {
        let magnitude = sample.magnitude();
        let counted = match self.last_magnitude {
            Some(prev) => {
                (magnitude - prev).abs() > self.config.step_threshold
                    && self.interval_elapsed(sample.timestamp)
            }
            None => false,
        };
        if counted {
            self.steps += 1;
            self.last_step_at = Some(sample.timestamp);
        }
        self.last_magnitude = Some(magnitude);
        counted
    }

    fn interval_elapsed(&self, at: DateTime<Utc>) -> bool {
        match self.last_step_at {
            Some(last) => at - last > self.config.min_step_interval,
            None => true,
        }
    }

    /// Steps counted since start or last reset.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn last_step_at(&self) -> Option<DateTime<Utc>> {
        self.last_step_at
    }

    /// Zero the counter. The magnitude cell survives so the next sample is
    /// compared against real history instead of being re-primed.
    pub fn reset(&mut self) {
        self.steps = 0;
        self.last_step_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(magnitude: f64, ms_offset: i64) -> MotionSample {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        MotionSample::new(magnitude, 0.0, 0.0, base + Duration::milliseconds(ms_offset))
    }

    fn walking_stream(count: usize, spacing_ms: i64) -> Vec<MotionSample> {
        // Alternate between rest and impulse magnitudes, well spaced.
        (0..count)
            .map(|i| {
                let mag = if i % 2 == 0 { 1.0 } else { 2.0 };
                sample(mag, i as i64 * spacing_ms)
            })
            .collect()
    }

    #[test]
    fn test_first_sample_only_primes() {
        let mut detector = StepDetector::new(StepConfig::default());
        assert!(!detector.process(&sample(2.5, 0)));
        assert_eq!(detector.steps(), 0);
    }

    #[test]
    fn test_counts_are_monotone_and_at_most_one_per_sample() {
        let mut detector = StepDetector::new(StepConfig::default());
        let mut previous = 0;
        for s in walking_stream(50, 300) {
            detector.process(&s);
            let current = detector.steps();
            assert!(current >= previous);
            assert!(current - previous <= 1);
            previous = current;
        }
        // Every impulse after priming is far enough apart to count.
        assert_eq!(detector.steps(), 49);
    }

    #[test]
    fn test_spikes_inside_interval_count_once() {
        let mut detector = StepDetector::new(StepConfig::default());
        detector.process(&sample(1.0, 0));
        assert!(detector.process(&sample(2.0, 100)));
        // 100ms later: big delta again, but inside the 200ms interval.
        assert!(!detector.process(&sample(1.0, 200)));
        assert_eq!(detector.steps(), 1);
    }

    #[test]
    fn test_spikes_outside_interval_count_twice() {
        let mut detector = StepDetector::new(StepConfig::default());
        detector.process(&sample(1.0, 0));
        assert!(detector.process(&sample(2.0, 100)));
        assert!(detector.process(&sample(1.0, 350)));
        assert_eq!(detector.steps(), 2);
    }

    #[test]
    fn test_magnitude_cell_updates_without_a_step() {
        let mut detector = StepDetector::new(StepConfig::default());
        detector.process(&sample(1.0, 0));
        // Sub-threshold drift must still move the comparison point.
        assert!(!detector.process(&sample(1.5, 300)));
        assert!(detector.process(&sample(2.5, 600)));
        assert_eq!(detector.steps(), 1);
    }

    #[test]
    fn test_small_deltas_never_count() {
        let mut detector = StepDetector::new(StepConfig::default());
        for i in 0..20i64 {
            let mag = 1.0 + 0.3 * ((i % 2) as f64);
            detector.process(&sample(mag, i * 500));
        }
        assert_eq!(detector.steps(), 0);
    }

    #[test]
    fn test_reset_keeps_magnitude_cell() {
        let mut detector = StepDetector::new(StepConfig::default());
        detector.process(&sample(1.0, 0));
        detector.process(&sample(2.0, 300));
        assert_eq!(detector.steps(), 1);

        detector.reset();
        assert_eq!(detector.steps(), 0);
        assert_eq!(detector.last_step_at(), None);

        // Compared against the kept cell (2.0), not re-primed.
        assert!(detector.process(&sample(1.0, 600)));
        assert_eq!(detector.steps(), 1);
    }
}
