//! Healtec Motion - on-device motion inference engine for step counting
//! and sleep session detection
//!
//! The engine turns a continuous accelerometer stream into observable
//! activity state through two detectors behind one facade:
//!
//! - **Step detection**: double-threshold peak detection over magnitude
//!   changes, debounced by a minimum interval between counted steps
//! - **Sleep detection**: a state machine over a bounded movement-event
//!   history that backdates the inferred onset and debounces the wake
//!   transition, then classifies session quality from restlessness
//!
//! Hosts push samples and periodic ticks in and read snapshots out. The
//! engine persists nothing and renders nothing.

pub mod clock;
pub mod error;
pub mod movement;
pub mod sleep;
pub mod step;
pub mod stream;
pub mod tracker;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TrackerError;
pub use sleep::{SleepConfig, SleepMonitor};
pub use step::{StepConfig, StepDetector};
pub use stream::SampleStream;
pub use tracker::{ActivityTracker, SampleOutcome, TrackerConfig};
pub use types::{
    MotionSample, SensorStatus, SleepPhase, SleepQuality, SleepSession, TrackerSnapshot,
};

/// Engine version embedded in every snapshot
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name embedded in every snapshot
pub const ENGINE_NAME: &str = "healtec-motion";
