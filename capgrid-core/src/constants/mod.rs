//! Constants for the CapGrid scan engine
//!
//! Every numeric default used by the scanner, converter and calibrator lives
//! here with its unit in the name. Values come from the FDC2214 datasheet and
//! from bench measurements on 8×8 electrode grids switched by SN74HC4051 muxes.
//!
//! ## Organization
//!
//! - **Sensors**: converter word size, reference clock, LC tank components
//! - **Time**: settle, discard, pacing and calibration intervals
//! - **Buffers**: compile-time capacities for scan cycles and calibration windows

/// Capacitance-to-digital converter and LC tank characteristics.
pub mod sensors;

/// Settle delays, read spacing, pacing and calibration timing.
pub mod time;

/// Buffer capacities for scan cycles and calibration windows.
pub mod buffers;

pub use sensors::{
    RAW_CODE_FULL_SCALE, RAW_CODE_MAX, DEVICE_CHANNELS,
    DEFAULT_REFERENCE_CLOCK_HZ, DEFAULT_INDUCTANCE_H, DEFAULT_PARASITIC_CAPACITANCE_F,
    MAX_SELECT_LINES,
};

pub use time::{
    US_PER_MS, ROW_SETTLE_US, COLUMN_SETTLE_US, CONVERSION_WAIT_MS,
    DISCARD_READS, DISCARD_SPACING_MS, NODE_PACING_MS, CYCLE_PACING_MS,
    STARTUP_SETTLE_MS, CALIBRATION_INTERVAL_MS, CALIBRATION_DURATION_MS,
};

pub use buffers::{MAX_CHANNELS, MAX_CALIBRATION_SAMPLES};
