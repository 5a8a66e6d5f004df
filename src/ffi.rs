//! FFI bindings for the motion engine
//!
//! This module provides C-compatible functions for embedding the engine in
//! mobile hosts. Samples are passed as primitives (the sensor callback
//! fires every second; forcing JSON through the boundary per sample would
//! be wasteful); snapshots come back as allocated JSON strings that must
//! be freed with `motion_free_string`.

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use chrono::TimeZone;
use chrono::Utc;

use crate::clock::{Clock, SystemClock};
use crate::tracker::{ActivityTracker, TrackerConfig};
use crate::types::{MotionSample, SensorStatus};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Tracker Lifecycle
// ============================================================================

/// Opaque handle to an ActivityTracker plus the clock its ticks read.
pub struct MotionTrackerHandle {
    tracker: ActivityTracker,
    clock: Box<dyn Clock>,
}

/// Create a new tracker with default tuning and the system clock.
///
/// # Safety
/// - Returns a pointer to a newly allocated tracker.
/// - Must be freed with `motion_tracker_free`.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_new() -> *mut MotionTrackerHandle {
    clear_last_error();

    let handle = Box::new(MotionTrackerHandle {
        tracker: ActivityTracker::new(TrackerConfig::default()),
        clock: Box::new(SystemClock),
    });
    Box::into_raw(handle)
}

/// Free a tracker.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `motion_tracker_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_free(handle: *mut MotionTrackerHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

// ============================================================================
// Sensor Status
// ============================================================================

/// Record the platform's accelerometer probe result.
/// Pass non-zero for available, zero for unavailable.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `motion_tracker_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_set_sensor_available(
    handle: *mut MotionTrackerHandle,
    available: i32,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let handle = &mut *handle;
    let status = if available != 0 {
        SensorStatus::Available
    } else {
        SensorStatus::Unavailable
    };
    handle.tracker.set_sensor_status(status);
    0
}

// ============================================================================
// Sample and Tick Driving
// ============================================================================

/// Feed one accelerometer sample.
///
/// `timestamp_ms` is Unix milliseconds UTC, as delivered by the platform
/// sensor event.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `motion_tracker_new`.
/// - Returns a non-negative bitmask on success: bit 0 set if a step was
///   counted, bit 1 set if a movement was recorded.
/// - Returns negative on error; call `motion_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_ingest(
    handle: *mut MotionTrackerHandle,
    x: f64,
    y: f64,
    z: f64,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let timestamp = match Utc.timestamp_millis_opt(timestamp_ms).single() {
        Some(t) => t,
        None => {
            set_last_error("Timestamp out of range");
            return -2;
        }
    };

    let handle = &mut *handle;
    let outcome = handle
        .tracker
        .handle_sample(&MotionSample::new(x, y, z, timestamp));

    let mut flags = 0;
    if outcome.step_counted {
        flags |= 1;
    }
    if outcome.movement_recorded {
        flags |= 2;
    }
    flags
}

/// Run one driver tick at the handle clock's current time.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `motion_tracker_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_tick(handle: *mut MotionTrackerHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let handle = &mut *handle;
    let now = handle.clock.now();
    handle.tracker.tick(now);
    0
}

/// Reset the whole pipeline back to monitoring.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `motion_tracker_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_reset(handle: *mut MotionTrackerHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let handle = &mut *handle;
    handle.tracker.reset();
    0
}

// ============================================================================
// State Reads
// ============================================================================

/// Current step count.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `motion_tracker_new`.
/// - Returns the count, or negative on error.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_steps(handle: *const MotionTrackerHandle) -> i64 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let handle = &*handle;
    i64::from(handle.tracker.steps())
}

/// Full engine snapshot as JSON, captured at the handle clock's time.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `motion_tracker_new`.
/// - Returns a newly allocated string that must be freed with
///   `motion_free_string`.
/// - Returns NULL on error; call `motion_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn motion_tracker_snapshot_json(
    handle: *const MotionTrackerHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }

    let handle = &*handle;
    let now = handle.clock.now();
    match handle.tracker.snapshot_json(now) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by motion functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a motion function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn motion_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next motion function call on
///   this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn motion_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the engine library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn motion_version() -> *const c_char {
    // Use a static CString to avoid allocation
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
