//! Time management for the scan loop
//!
//! Two capabilities are needed by the engine:
//! - a monotonic millisecond source to stamp records
//! - blocking delays for settle, discard spacing and pacing
//!
//! Delays use `embedded_hal::delay::DelayNs` so any HAL delay provider plugs in
//! directly. A [`Clock`] is anything offering both. [`SimulatedClock`] advances
//! simulated time on every delay and is what tests and host simulations use.

use embedded_hal::delay::DelayNs;

use crate::constants::time::NS_PER_MS;

/// Timestamp in milliseconds since device boot (monotonic sources) or epoch
pub type Timestamp = u64;

/// Source of time for the system
pub trait TimeSource {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs monotonic)
    fn is_wall_clock(&self) -> bool;

    /// Get precision in milliseconds
    fn precision_ms(&self) -> u32;
}

/// Time source plus blocking delay: everything the scan loop needs from time
pub trait Clock: TimeSource + DelayNs {}

impl<T: TimeSource + DelayNs> Clock for T {}

/// Deterministic clock for tests and simulation
///
/// Starts at the given millisecond and only moves when a delay is requested
/// or [`SimulatedClock::advance`] is called. Nanosecond resolution so that
/// microsecond settle times accumulate exactly.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    elapsed_ns: u64,
}

impl SimulatedClock {
    pub fn new(start_ms: Timestamp) -> Self {
        Self { elapsed_ns: start_ms * NS_PER_MS }
    }

    /// Move time forward without a delay call
    pub fn advance(&mut self, ms: u64) {
        self.elapsed_ns += ms * NS_PER_MS;
    }

    /// Current simulated time in microseconds
    pub fn now_us(&self) -> u64 {
        self.elapsed_ns / 1000
    }
}

impl TimeSource for SimulatedClock {
    fn now(&self) -> Timestamp {
        self.elapsed_ns / NS_PER_MS
    }

    fn is_wall_clock(&self) -> bool {
        false
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

impl DelayNs for SimulatedClock {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns += u64::from(ns);
    }
}

/// Host clock backed by `std::time::Instant` (requires std)
///
/// Delays block the calling thread; there is nothing else to run while a
/// channel settles.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct StdClock {
    start: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for StdClock {
    fn now(&self) -> Timestamp {
        self.start.elapsed().as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        false
    }

    fn precision_ms(&self) -> u32 {
        1
    }
}

#[cfg(feature = "std")]
impl DelayNs for StdClock {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
