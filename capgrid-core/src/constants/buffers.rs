//! Buffer Sizes and Memory Constraints
//!
//! All collections in the scan path are fixed-capacity `heapless` types, so
//! their sizes are decided here at compile time.

use super::time::{CALIBRATION_DURATION_MS, CALIBRATION_INTERVAL_MS};

/// Most channels one scan plan may hold.
///
/// An 8×8 grid behind two 8:1 multiplexers.
pub const MAX_CHANNELS: usize = 64;

/// Default calibration window capacity per channel.
///
/// `CALIBRATION_DURATION_MS / CALIBRATION_INTERVAL_MS` = 200 samples,
/// 1.6 KB per channel in the `f64` domain.
pub const MAX_CALIBRATION_SAMPLES: usize =
    (CALIBRATION_DURATION_MS / CALIBRATION_INTERVAL_MS) as usize;
