//! Core types for the motion inference engine
//!
//! This module defines the data structures that flow through the engine:
//! accelerometer samples in, step counts and sleep sessions out, plus the
//! serializable snapshot handed to presentation and persistence layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single tri-axial accelerometer reading.
///
/// Values are in g-units as delivered by the platform sensor. Samples are
/// ephemeral: the engine consumes them and keeps only derived state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Acceleration along the x axis (g)
    pub x: f64,
    /// Acceleration along the y axis (g)
    pub y: f64,
    /// Acceleration along the z axis (g)
    pub z: f64,
    /// Capture time (UTC)
    pub timestamp: DateTime<Utc>,
}

impl MotionSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: DateTime<Utc>) -> Self {
        Self { x, y, z, timestamp }
    }

    /// Euclidean norm of the acceleration vector.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Availability of the platform accelerometer.
///
/// `Unavailable` is terminal for the current process: availability is only
/// probed again on the next app start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Unknown,
    Available,
    Unavailable,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Unknown => "unknown",
            SensorStatus::Available => "available",
            SensorStatus::Unavailable => "unavailable",
        }
    }
}

/// Phase of the sleep detection state machine.
///
/// Exactly one phase is active at a time and it gates which detection
/// routine may fire on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepPhase {
    Monitoring,
    Sleeping,
    Awake,
}

impl SleepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepPhase::Monitoring => "monitoring",
            SleepPhase::Sleeping => "sleeping",
            SleepPhase::Awake => "awake",
        }
    }
}

/// Sleep quality classification derived from restlessness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl SleepQuality {
    /// Classify by movements per hour during the session:
    /// `< 5` excellent, `< 10` good, `< 20` fair, otherwise poor.
    pub fn from_movements_per_hour(rate: f64) -> Self {
        if rate < 5.0 {
            SleepQuality::Excellent
        } else if rate < 10.0 {
            SleepQuality::Good
        } else if rate < 20.0 {
            SleepQuality::Fair
        } else {
            SleepQuality::Poor
        }
    }

    /// Stable label key for presentation layers.
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepQuality::Poor => "poor",
            SleepQuality::Fair => "fair",
            SleepQuality::Good => "good",
            SleepQuality::Excellent => "excellent",
        }
    }
}

/// One inferred sleep session.
///
/// `start_time` is set exactly once, when onset is confirmed (backdated to
/// the inferred onset instant). `end_time` and the final `quality` are set
/// exactly once, when wake is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSession {
    /// Inferred sleep onset (UTC)
    pub start_time: Option<DateTime<Utc>>,
    /// Confirmed wake time (UTC)
    pub end_time: Option<DateTime<Utc>>,
    /// Whole minutes slept, floored
    pub duration_minutes: i64,
    /// Quality classification (final once `end_time` is set)
    pub quality: SleepQuality,
}

impl Default for SleepSession {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            duration_minutes: 0,
            quality: SleepQuality::Fair,
        }
    }
}

impl SleepSession {
    /// Whether the session has both a confirmed onset and a confirmed wake.
    pub fn is_complete(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_some()
    }
}

/// Engine provenance carried in every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInfo {
    /// Engine name
    pub name: String,
    /// Engine version (crate version)
    pub version: String,
    /// Unique id of this tracker instance
    pub instance_id: String,
}

/// Step-counter portion of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Steps counted since start or last reset
    pub count: u32,
    /// Time of the most recent counted step (UTC)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_step_at: Option<DateTime<Utc>>,
}

/// Sleep-monitor portion of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepSnapshot {
    /// Current phase of the state machine
    pub phase: SleepPhase,
    /// Current session (defaults until onset is confirmed)
    pub session: SleepSession,
    /// Movements recorded since start or last reset
    pub total_movements: u64,
    /// Movements recorded in the last 30 minutes
    pub movements_last_half_hour: usize,
    /// Movement rate over the onset lookback window; absent while the log
    /// does not yet cover enough of the window to be meaningful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movements_per_hour: Option<f64>,
}

/// Full serializable view of the engine for hosts.
///
/// Hosts render from this and may persist it; the engine itself never
/// persists anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Engine provenance
    pub engine: EngineInfo,
    /// Snapshot capture time (UTC)
    pub captured_at: DateTime<Utc>,
    /// Platform sensor availability
    pub sensor: SensorStatus,
    /// Step-counter state
    pub steps: StepSnapshot,
    /// Sleep-monitor state
    pub sleep: SleepSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_unit_vector() {
        let s = MotionSample::new(0.0, 0.0, 1.0, Utc::now());
        assert!((s.magnitude() - 1.0).abs() < 1e-12);

        let s = MotionSample::new(3.0, 4.0, 0.0, Utc::now());
        assert!((s.magnitude() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_quality_boundaries() {
        assert_eq!(
            SleepQuality::from_movements_per_hour(4.9),
            SleepQuality::Excellent
        );
        assert_eq!(
            SleepQuality::from_movements_per_hour(5.0),
            SleepQuality::Good
        );
        assert_eq!(
            SleepQuality::from_movements_per_hour(9.9),
            SleepQuality::Good
        );
        assert_eq!(
            SleepQuality::from_movements_per_hour(10.0),
            SleepQuality::Fair
        );
        assert_eq!(
            SleepQuality::from_movements_per_hour(19.9),
            SleepQuality::Fair
        );
        assert_eq!(
            SleepQuality::from_movements_per_hour(20.1),
            SleepQuality::Poor
        );
    }

    #[test]
    fn test_quality_serde_labels() {
        let json = serde_json::to_string(&SleepQuality::Excellent).unwrap();
        assert_eq!(json, "\"excellent\"");
        let back: SleepQuality = serde_json::from_str("\"poor\"").unwrap();
        assert_eq!(back, SleepQuality::Poor);
    }

    #[test]
    fn test_session_default() {
        let session = SleepSession::default();
        assert_eq!(session.start_time, None);
        assert_eq!(session.end_time, None);
        assert_eq!(session.duration_minutes, 0);
        assert_eq!(session.quality, SleepQuality::Fair);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_sample_deserialize() {
        let json = r#"{"x":0.01,"y":-0.02,"z":0.98,"timestamp":"2024-01-15T22:30:00Z"}"#;
        let sample: MotionSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.z, 0.98);
        assert_eq!(sample.timestamp.to_rfc3339(), "2024-01-15T22:30:00+00:00");
    }
}
