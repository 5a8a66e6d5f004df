//! Sleep session inference from movement history
//!
//! A three-phase state machine driven by periodic ticks over the movement
//! log. `Monitoring` watches for a sustained low-movement period and, once
//! confirmed, backdates the session start to the inferred onset instant.
//! `Sleeping` keeps the running duration current and watches for a
//! sustained burst of movement; confirming one stamps the end time and
//! classifies the session quality. `Awake` is inert until reset.
//!
//! The machine only ever has probabilistic evidence after the fact, so
//! both transitions are debounced: onset requires the low-movement period
//! to persist, wake requires the movement burst to persist.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::movement::MovementLog;
use crate::types::{MotionSample, SleepPhase, SleepQuality, SleepSession};

/// Tuning for movement observation and the sleep state machine.
#[derive(Debug, Clone)]
pub struct SleepConfig {
    /// Minimum magnitude change between consecutive samples to count as
    /// bodily movement (g); deliberately below the step threshold so
    /// ambient and in-bed motion is caught
    pub movement_threshold: f64,
    /// How long movement records are retained
    pub retention: Duration,
    /// Window inspected when computing the onset movement rate
    pub onset_lookback: Duration,
    /// Movement rates at or above this (events/hour) keep the monitor in
    /// `Monitoring`
    pub onset_rate_threshold: f64,
    /// How long a low-movement period must persist before onset is
    /// confirmed. Tunable pending field validation.
    pub onset_confirm: Duration,
    /// History required beyond the lookback before onset detection may
    /// run at all
    pub history_margin: Duration,
    /// Minimum fraction of the lookback the log must span for the rate to
    /// be decidable
    pub min_coverage: f64,
    /// Window inspected for wake detection
    pub wake_window: Duration,
    /// Counts above this inside the wake window open a wake candidate
    pub wake_count_threshold: usize,
    /// How long the wake condition must hold before the session ends.
    /// Tunable pending field validation.
    pub wake_debounce: Duration,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.3,
            retention: Duration::hours(3),
            onset_lookback: Duration::hours(2),
            onset_rate_threshold: 5.0,
            onset_confirm: Duration::hours(2),
            history_margin: Duration::minutes(30),
            min_coverage: 0.8,
            wake_window: Duration::minutes(30),
            wake_count_threshold: 10,
            wake_debounce: Duration::minutes(5),
        }
    }
}

/// Movement observer plus the sleep session state machine.
///
/// Owns the movement log exclusively; the step detector never reads it.
#[derive(Debug)]
pub struct SleepMonitor {
    config: SleepConfig,
    phase: SleepPhase,
    session: SleepSession,
    log: MovementLog,
    last_magnitude: Option<f64>,
    onset_candidate: Option<DateTime<Utc>>,
    wake_candidate_since: Option<DateTime<Utc>>,
    movements_during_sleep: u32,
    total_movements: u64,
}

impl SleepMonitor {
    pub fn new(config: SleepConfig) -> Self {
        let log = MovementLog::new(config.retention);
        Self {
            config,
            phase: SleepPhase::Monitoring,
            session: SleepSession::default(),
            log,
            last_magnitude: None,
            onset_candidate: None,
            wake_candidate_since: None,
            movements_during_sleep: 0,
            total_movements: 0,
        }
    }

    /// Consume one sample; returns whether a movement was recorded.
    ///
    /// Keeps its own magnitude cell, separate from the step detector's:
    /// the two use different thresholds and must not share state. The
    /// first sample only primes the cell.
    pub fn observe(&mut self, sample: &MotionSample) -> bool {
        let magnitude = sample.magnitude();
        let moved = match self.last_magnitude {
            Some(prev) => (magnitude - prev).abs() > self.config.movement_threshold,
            None => false,
        };
        if moved {
            self.log.record(sample.timestamp);
            self.total_movements += 1;
            if self.phase == SleepPhase::Sleeping {
                self.movements_during_sleep += 1;
            }
        }
        self.last_magnitude = Some(magnitude);
        moved
    }

    /// One maintenance-and-transition pass.
    ///
    /// Order matters: purge first so windowed counts never see expired
    /// records, then bring the running duration up to date before any
    /// transition can close the session with a final value.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.log.purge(now);
        if self.phase == SleepPhase::Sleeping {
            if let Some(start) = self.session.start_time {
                self.session.duration_minutes = minutes_between(start, now);
            }
        }
        self.check_onset(now);
        self.check_wake(now);
    }

    fn check_onset(&mut self, now: DateTime<Utc>) {
        if self.phase != SleepPhase::Monitoring {
            return;
        }

        // Onset needs deeper history than the rate computation itself:
        // the full lookback plus a margin. A freshly started engine can
        // never mistake "no data yet" for a night of stillness.
        let required_history = self.config.onset_lookback + self.config.history_margin;
        match self.log.oldest() {
            Some(oldest) if oldest <= now - required_history => {}
            _ => return,
        }

        let Some(rate) =
            self.log
                .rate_per_hour(now, self.config.onset_lookback, self.config.min_coverage)
        else {
            return;
        };

        if rate >= self.config.onset_rate_threshold {
            self.onset_candidate = None;
            return;
        }

        if self.onset_candidate.is_none() {
            // Anchor at the moment the low-movement period began: the
            // earliest record still inside the lookback, or the window
            // start when the window holds no records at all.
            let window_start = now - self.config.onset_lookback;
            let anchor = self
                .log
                .earliest_since(window_start)
                .unwrap_or(window_start);
            self.onset_candidate = Some(anchor);
            debug!("low-movement period anchored at {anchor}");
        }

        if let Some(anchor) = self.onset_candidate {
            if now - anchor >= self.config.onset_confirm {
                self.confirm_onset(anchor, now);
            }
        }
    }

    fn confirm_onset(&mut self, onset: DateTime<Utc>, now: DateTime<Utc>) {
        self.session.start_time = Some(onset);
        self.session.end_time = None;
        self.session.duration_minutes = minutes_between(onset, now);
        self.movements_during_sleep = 0;
        self.onset_candidate = None;
        self.wake_candidate_since = None;
        self.phase = SleepPhase::Sleeping;
        info!(
            "sleep onset confirmed at {now}, backdated start {onset} ({} min in)",
            self.session.duration_minutes
        );
    }

    fn check_wake(&mut self, now: DateTime<Utc>) {
        if self.phase != SleepPhase::Sleeping {
            return;
        }

        let recent = self.log.count_in_window(now, self.config.wake_window);
        if recent > self.config.wake_count_threshold {
            let held_since = *self.wake_candidate_since.get_or_insert(now);
            if now - held_since >= self.config.wake_debounce {
                self.confirm_wake(now);
            }
        } else {
            // Condition receded before the debounce elapsed; start over.
            self.wake_candidate_since = None;
        }
    }

    fn confirm_wake(&mut self, now: DateTime<Utc>) {
        let start = self.session.start_time.unwrap_or(now);
        let duration = minutes_between(start, now);
        let rate = if duration > 0 {
            self.movements_during_sleep as f64 / duration as f64 * 60.0
        } else {
            self.movements_during_sleep as f64
        };

        self.session.end_time = Some(now);
        self.session.duration_minutes = duration;
        self.session.quality = SleepQuality::from_movements_per_hour(rate);
        info!(
            "wake confirmed at {now}: {duration} min slept, {:.1} movements/hour, quality {}",
            rate,
            self.session.quality.as_str()
        );

        self.log.clear();
        self.onset_candidate = None;
        self.wake_candidate_since = None;
        self.movements_during_sleep = 0;
        self.phase = SleepPhase::Awake;
    }

    /// Return to `Monitoring` with a fresh session. Valid from any phase.
    ///
    /// The magnitude cell survives: it describes the sensor stream, not
    /// the session.
    pub fn reset(&mut self) {
        self.session = SleepSession::default();
        self.phase = SleepPhase::Monitoring;
        self.log.clear();
        self.onset_candidate = None;
        self.wake_candidate_since = None;
        self.movements_during_sleep = 0;
        self.total_movements = 0;
        info!("sleep session reset");
    }

    pub fn phase(&self) -> SleepPhase {
        self.phase
    }

    pub fn session(&self) -> &SleepSession {
        &self.session
    }

    /// Movements recorded since start or last reset.
    pub fn total_movements(&self) -> u64 {
        self.total_movements
    }

    /// Movements inside the wake window ending at `now`.
    pub fn recent_movements(&self, now: DateTime<Utc>) -> usize {
        self.log.count_in_window(now, self.config.wake_window)
    }

    /// Movement rate over the onset lookback, when decidable.
    pub fn movement_rate(&self, now: DateTime<Utc>) -> Option<f64> {
        self.log
            .rate_per_hour(now, self.config.onset_lookback, self.config.min_coverage)
    }

    pub fn config(&self) -> &SleepConfig {
        &self.config
    }
}

fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_minutes().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Drives a monitor with togglable movement samples and quiet samples.
    struct Harness {
        monitor: SleepMonitor,
        toggle: bool,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                monitor: SleepMonitor::new(SleepConfig::default()),
                toggle: false,
            }
        }

        /// Prime the magnitude cell without recording anything.
        fn prime(&mut self, at: DateTime<Utc>) {
            self.monitor.observe(&MotionSample::new(1.0, 0.0, 0.0, at));
        }

        /// One sample whose magnitude flips far enough to record a movement.
        fn movement(&mut self, at: DateTime<Utc>) {
            let mag = if self.toggle { 1.0 } else { 1.4 };
            self.toggle = !self.toggle;
            let recorded = self.monitor.observe(&MotionSample::new(mag, 0.0, 0.0, at));
            assert!(recorded, "harness sample at {at} should record a movement");
        }

        fn tick(&mut self, at: DateTime<Utc>) {
            self.monitor.tick(at);
        }

        /// Tick once per minute over [from, to], inclusive.
        fn tick_minutes(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) {
            let mut t = from;
            while t <= to {
                self.tick(t);
                t = t + Duration::minutes(1);
            }
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 19, 30, 0).unwrap()
    }

    /// Monitor asleep since 22:01 with a backdated start of 20:01.
    fn sleeping_harness() -> (Harness, DateTime<Utc>) {
        let mut h = Harness::new();
        h.prime(base());
        h.movement(base() + Duration::seconds(1));
        let confirm = Utc.with_ymd_and_hms(2024, 1, 15, 22, 1, 0).unwrap();
        h.tick_minutes(base() + Duration::minutes(1), confirm);
        assert_eq!(h.monitor.phase(), SleepPhase::Sleeping);
        let start = h.monitor.session().start_time.unwrap();
        (h, start)
    }

    #[test]
    fn test_starts_monitoring_with_default_session() {
        let monitor = SleepMonitor::new(SleepConfig::default());
        assert_eq!(monitor.phase(), SleepPhase::Monitoring);
        assert_eq!(*monitor.session(), SleepSession::default());
        assert_eq!(monitor.total_movements(), 0);
    }

    #[test]
    fn test_movement_threshold_filters_small_drift() {
        let mut monitor = SleepMonitor::new(SleepConfig::default());
        let t = base();
        monitor.observe(&MotionSample::new(1.0, 0.0, 0.0, t));
        // Sensor jitter under the threshold is not bodily movement.
        let moved = monitor.observe(&MotionSample::new(1.25, 0.0, 0.0, t + Duration::seconds(1)));
        assert!(!moved);
        let moved = monitor.observe(&MotionSample::new(1.61, 0.0, 0.0, t + Duration::seconds(2)));
        assert!(moved);
        assert_eq!(monitor.total_movements(), 1);
    }

    #[test]
    fn test_empty_log_never_sleeps() {
        let mut h = Harness::new();
        h.prime(base());
        // Ten hours of perfect stillness with no movement ever recorded.
        h.tick_minutes(base(), base() + Duration::hours(10));
        assert_eq!(h.monitor.phase(), SleepPhase::Monitoring);
    }

    #[test]
    fn test_short_history_never_sleeps() {
        let mut h = Harness::new();
        h.prime(base());
        h.movement(base() + Duration::seconds(1));
        // 2h24m later the oldest record is still inside the required
        // history horizon, so even a near-zero rate must not transition.
        h.tick_minutes(base() + Duration::minutes(1), base() + Duration::minutes(144));
        assert_eq!(h.monitor.phase(), SleepPhase::Monitoring);
        assert_eq!(h.monitor.session().start_time, None);
    }

    #[test]
    fn test_onset_backdates_start_to_low_movement_anchor() {
        let mut h = Harness::new();
        h.prime(base()); // 19:30
        h.movement(base() + Duration::seconds(1));
        let anchor = Utc.with_ymd_and_hms(2024, 1, 15, 20, 30, 0).unwrap();
        h.movement(anchor);

        // History suffices from 22:00; the anchor is the earliest record
        // inside the lookback, and confirmation lands at anchor + 2h.
        let last_monitoring = Utc.with_ymd_and_hms(2024, 1, 15, 22, 29, 0).unwrap();
        h.tick_minutes(base() + Duration::minutes(1), last_monitoring);
        assert_eq!(h.monitor.phase(), SleepPhase::Monitoring);

        let confirm = Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap();
        h.tick(confirm);
        assert_eq!(h.monitor.phase(), SleepPhase::Sleeping);

        let session = h.monitor.session();
        assert_eq!(session.start_time, Some(anchor));
        assert_eq!(session.end_time, None);
        assert_eq!(session.duration_minutes, 120);
    }

    #[test]
    fn test_activity_clears_onset_candidate() {
        let mut h = Harness::new();
        h.prime(base());
        h.movement(base() + Duration::seconds(1));
        // One movement at 21:00 becomes the anchor once history suffices,
        // putting the would-be confirmation at 23:00.
        let anchor = Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap();
        h.movement(anchor);
        h.tick_minutes(base() + Duration::minutes(1), anchor + Duration::minutes(69));
        assert_eq!(h.monitor.phase(), SleepPhase::Monitoring);

        // A restless spell at 22:10 pushes the rate to 5.5/h.
        let restless = Utc.with_ymd_and_hms(2024, 1, 15, 22, 10, 0).unwrap();
        for i in 0..10 {
            h.movement(restless + Duration::seconds(i * 10));
        }

        // Tick well past 23:00: the old anchor must not confirm.
        h.tick_minutes(restless + Duration::minutes(2), restless + Duration::minutes(55));
        assert_eq!(h.monitor.phase(), SleepPhase::Monitoring);
        assert_eq!(h.monitor.session().start_time, None);
    }

    #[test]
    fn test_duration_tracks_clock_while_sleeping() {
        let (mut h, start) = sleeping_harness();
        assert_eq!(h.monitor.session().duration_minutes, 120);

        h.tick(start + Duration::minutes(150));
        assert_eq!(h.monitor.session().duration_minutes, 150);
        assert_eq!(h.monitor.phase(), SleepPhase::Sleeping);
    }

    #[test]
    fn test_brief_burst_does_not_wake() {
        let (mut h, _start) = sleeping_harness();
        let m = Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap();

        // Eight movements now, three more at the end of the window: the
        // count tops 10 only until the first eight age out, which happens
        // two minutes later and well inside the five-minute debounce.
        for i in 0..8 {
            h.movement(m + Duration::seconds(i));
        }
        h.tick_minutes(m + Duration::minutes(1), m + Duration::minutes(28));
        assert_eq!(h.monitor.phase(), SleepPhase::Sleeping);

        let late = m + Duration::minutes(29);
        for i in 0..3 {
            h.movement(late + Duration::seconds(i));
        }
        h.tick_minutes(late, late + Duration::minutes(16));

        assert_eq!(h.monitor.phase(), SleepPhase::Sleeping);
        assert_eq!(h.monitor.session().end_time, None);
    }

    /// From 23:00, one movement every 20s for nine minutes with minute
    /// ticks interleaved, until the machine leaves `Sleeping`.
    fn drive_to_awake(h: &mut Harness) {
        let burst = Utc.with_ymd_and_hms(2024, 1, 15, 23, 0, 0).unwrap();
        let mut t = burst;
        while h.monitor.phase() == SleepPhase::Sleeping && t <= burst + Duration::minutes(20) {
            let elapsed = t - burst;
            if elapsed.num_seconds() % 20 == 0 && elapsed < Duration::minutes(9) {
                h.movement(t);
            }
            if elapsed.num_seconds() % 60 == 0 {
                h.tick(t);
            }
            t = t + Duration::seconds(1);
        }
    }

    #[test]
    fn test_sustained_burst_wakes_and_scores() {
        let (mut h, start) = sleeping_harness();
        drive_to_awake(&mut h);

        // The 30-minute count passes 10 at the 23:04 tick; five held
        // minutes later the session ends.
        assert_eq!(h.monitor.phase(), SleepPhase::Awake);
        let session = h.monitor.session();
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 23, 9, 0).unwrap();
        assert_eq!(session.end_time, Some(end));
        assert_eq!(session.start_time, Some(start));
        assert_eq!(session.duration_minutes, 188);

        // 27 movements over 188 minutes is ~8.6/hour.
        assert_eq!(session.quality, SleepQuality::Good);

        // Wake clears the log.
        assert_eq!(h.monitor.recent_movements(end), 0);
    }

    #[test]
    fn test_record_at_retention_horizon_is_purged() {
        let mut h = Harness::new();
        h.prime(base());
        h.movement(base() + Duration::seconds(1));

        // First tick exactly at the retention horizon: the only record is
        // purged before the gate looks at it, so nothing can anchor.
        let only_tick = base() + Duration::seconds(1) + Duration::hours(3);
        h.tick(only_tick);
        assert_eq!(h.monitor.phase(), SleepPhase::Monitoring);
        assert_eq!(h.monitor.recent_movements(only_tick), 0);
    }

    #[test]
    fn test_reset_is_identical_from_every_phase() {
        let expect_fresh = |monitor: &SleepMonitor| {
            assert_eq!(monitor.phase(), SleepPhase::Monitoring);
            assert_eq!(*monitor.session(), SleepSession::default());
            assert_eq!(monitor.total_movements(), 0);
            assert_eq!(monitor.recent_movements(base() + Duration::hours(24)), 0);
        };

        // From monitoring.
        let mut h = Harness::new();
        h.prime(base());
        h.movement(base() + Duration::seconds(1));
        h.monitor.reset();
        expect_fresh(&h.monitor);

        // From sleeping.
        let (mut h, _) = sleeping_harness();
        h.monitor.reset();
        expect_fresh(&h.monitor);

        // From awake.
        let (mut h, _) = sleeping_harness();
        drive_to_awake(&mut h);
        assert_eq!(h.monitor.phase(), SleepPhase::Awake);
        h.monitor.reset();
        expect_fresh(&h.monitor);
    }

    #[test]
    fn test_reset_keeps_magnitude_cell() {
        let mut h = Harness::new();
        h.prime(base());
        h.movement(base() + Duration::seconds(1));
        h.monitor.reset();

        // The next flip still registers against the kept cell instead of
        // silently re-priming.
        h.movement(base() + Duration::seconds(2));
        assert_eq!(h.monitor.total_movements(), 1);
    }
}
