//! Time-Related Constants
//!
//! Settle and pacing defaults for switching a converter input between
//! electrodes. Rows hang on longer traces than columns, so they carry more
//! capacitance and need at least as long to settle.

// ===== TIME UNIT CONVERSIONS =====

/// Microseconds per millisecond.
pub const US_PER_MS: u32 = 1000;

/// Nanoseconds per millisecond.
pub const NS_PER_MS: u64 = 1_000_000;

// ===== SETTLE AND DISCARD =====

/// Settle after switching the row (or single) multiplexer (µs).
///
/// Covers switch transients and oscillator re-lock on the new load.
pub const ROW_SETTLE_US: u32 = 8000;

/// Settle after switching the column multiplexer (µs).
pub const COLUMN_SETTLE_US: u32 = 8000;

/// Wait for the converter to finish a conversion cycle after settling (ms).
///
/// One autoscan pass over two channels takes about 3.4 ms; two passes plus
/// margin rounds to 10 ms.
pub const CONVERSION_WAIT_MS: u32 = 10;

/// Throwaway reads taken before the accepted reading.
pub const DISCARD_READS: u8 = 2;

/// Spacing between discard reads (ms).
pub const DISCARD_SPACING_MS: u32 = 5;

// ===== PACING =====

/// Pause after each accepted node reading (ms).
pub const NODE_PACING_MS: u32 = 50;

/// Pause after each complete sweep (ms).
pub const CYCLE_PACING_MS: u32 = 100;

/// Wait after configuring the device with the muxes parked at state 0 (ms).
pub const STARTUP_SETTLE_MS: u32 = 200;

// ===== CALIBRATION =====

/// Baseline sampling interval (ms), 20 Hz.
pub const CALIBRATION_INTERVAL_MS: u32 = 50;

/// Baseline window length (ms).
pub const CALIBRATION_DURATION_MS: u32 = 10_000;
