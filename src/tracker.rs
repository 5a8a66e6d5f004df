//! Engine facade
//!
//! [`ActivityTracker`] wires the step detector and the sleep monitor
//! behind one state boundary and assembles the snapshot hosts read. The
//! sample callback and the tick timer both land here; nothing else in the
//! crate mutates engine state.

use chrono::{DateTime, Utc};
use log::warn;
use uuid::Uuid;

use crate::error::TrackerError;
use crate::sleep::{SleepConfig, SleepMonitor};
use crate::step::{StepConfig, StepDetector};
use crate::types::{
    EngineInfo, MotionSample, SensorStatus, SleepPhase, SleepSession, SleepSnapshot, StepSnapshot,
    TrackerSnapshot,
};
use crate::{ENGINE_NAME, ENGINE_VERSION};

/// Combined tuning for the whole engine.
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    pub step: StepConfig,
    pub sleep: SleepConfig,
}

/// What one sample did to the engine state.
///
/// A large impulse can count as both a step and a movement; the two
/// detectors judge the same sample independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleOutcome {
    pub step_counted: bool,
    pub movement_recorded: bool,
}

type StepListener = Box<dyn FnMut(u32) + Send>;

/// The single synchronization boundary for all engine state.
///
/// The run-to-completion contract: each `handle_sample` or `tick` call
/// finishes before the next begins. The tracker is `Send`; a host with a
/// real sensor thread and a timer thread wraps it in one `Mutex` so the
/// two can never interleave mid-transition.
pub struct ActivityTracker {
    instance_id: Uuid,
    sensor: SensorStatus,
    steps: StepDetector,
    sleep: SleepMonitor,
    step_listener: Option<StepListener>,
}

impl ActivityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            sensor: SensorStatus::Unknown,
            steps: StepDetector::new(config.step),
            sleep: SleepMonitor::new(config.sleep),
            step_listener: None,
        }
    }

    /// Register a hook fired after every step-count increment, for hosts
    /// that persist the count externally. The engine persists nothing.
    pub fn set_step_listener(&mut self, listener: StepListener) {
        self.step_listener = Some(listener);
    }

    /// Record the platform's sensor probe result.
    ///
    /// `Unavailable` is terminal for this process: samples are dropped
    /// from then on and the status is surfaced in every snapshot.
    pub fn set_sensor_status(&mut self, status: SensorStatus) {
        self.sensor = status;
    }

    pub fn sensor_status(&self) -> SensorStatus {
        self.sensor
    }

    /// Feed one accelerometer sample through both detectors.
    pub fn handle_sample(&mut self, sample: &MotionSample) -> SampleOutcome {
        if self.sensor == SensorStatus::Unavailable {
            warn!("motion sample ignored: sensor flagged unavailable");
            return SampleOutcome::default();
        }
        let step_counted = self.steps.process(sample);
        let movement_recorded = self.sleep.observe(sample);
        if step_counted {
            let count = self.steps.steps();
            if let Some(listener) = self.step_listener.as_mut() {
                listener(count);
            }
        }
        SampleOutcome {
            step_counted,
            movement_recorded,
        }
    }

    /// One driver tick: log maintenance, duration update, then the onset
    /// and wake checks, in that order.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.sleep.tick(now);
    }

    /// Zero the whole pipeline and return to `Monitoring`.
    ///
    /// Sensor availability survives: it describes the device, not the
    /// session.
    pub fn reset(&mut self) {
        self.steps.reset();
        self.sleep.reset();
    }

    pub fn steps(&self) -> u32 {
        self.steps.steps()
    }

    pub fn last_step_at(&self) -> Option<DateTime<Utc>> {
        self.steps.last_step_at()
    }

    pub fn phase(&self) -> SleepPhase {
        self.sleep.phase()
    }

    pub fn session(&self) -> &SleepSession {
        self.sleep.session()
    }

    pub fn total_movements(&self) -> u64 {
        self.sleep.total_movements()
    }

    /// Assemble the serializable view hosts render from.
    pub fn snapshot(&self, now: DateTime<Utc>) -> TrackerSnapshot {
        TrackerSnapshot {
            engine: EngineInfo {
                name: ENGINE_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
                instance_id: self.instance_id.to_string(),
            },
            captured_at: now,
            sensor: self.sensor,
            steps: StepSnapshot {
                count: self.steps.steps(),
                last_step_at: self.steps.last_step_at(),
            },
            sleep: SleepSnapshot {
                phase: self.sleep.phase(),
                session: self.sleep.session().clone(),
                total_movements: self.sleep.total_movements(),
                movements_last_half_hour: self.sleep.recent_movements(now),
                movements_per_hour: self.sleep.movement_rate(now),
            },
        }
    }

    /// Snapshot as a JSON string, for FFI and host bridges.
    pub fn snapshot_json(&self, now: DateTime<Utc>) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(&self.snapshot(now))?)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
