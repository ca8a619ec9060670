//! Single-channel read sequence
//!
//! One accepted reading always follows the same strict sequence:
//!
//! ```text
//! 1. drive select lines for the channel   (row, then column on grids)
//! 2. wait the settle time                 (row settle, then column settle)
//! 3. wait for a fresh conversion
//! 4. take `discard_reads` throwaway reads, each followed by its spacing
//! 5. take the final read and return it
//! ```
//!
//! Any other order returns a code still carrying the previous electrode's
//! capacitance, because the oscillator has not re-locked on the new load.
//! The sequence is never interleaved with another channel's addressing: the
//! reader owns the select lines, the sensor and the clock for its lifetime.

use crate::constants::time::{
    COLUMN_SETTLE_US, CONVERSION_WAIT_MS, DISCARD_READS, DISCARD_SPACING_MS, ROW_SETTLE_US,
};
use crate::device::{CapacitanceSensor, DeviceConfig};
use crate::errors::ScanResult;
use crate::mux::{Address, Multiplexer, SelectBits, Topology};
use crate::reading::RawReading;
use crate::time::Clock;

/// Settle and discard parameters for one channel read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadTiming {
    /// Settle after switching the row mux, or the only mux (µs)
    pub row_settle_us: u32,
    /// Settle after switching the column mux (µs)
    pub col_settle_us: u32,
    /// Wait for a conversion on the new load before the first read (ms)
    pub conversion_wait_ms: u32,
    /// Throwaway reads before the accepted one
    pub discard_reads: u8,
    /// Pause after each throwaway read (ms)
    pub discard_spacing_ms: u32,
}

impl Default for ReadTiming {
    fn default() -> Self {
        Self {
            row_settle_us: ROW_SETTLE_US,
            col_settle_us: COLUMN_SETTLE_US,
            conversion_wait_ms: CONVERSION_WAIT_MS,
            discard_reads: DISCARD_READS,
            discard_spacing_ms: DISCARD_SPACING_MS,
        }
    }
}

/// What to do when the device fails a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReadFailurePolicy {
    /// Propagate the first failure
    #[default]
    Fail,
    /// Re-issue the failed read up to `attempts` more times
    Retry {
        /// Extra attempts per read
        attempts: u8,
    },
}

/// Owns the select lines, the sensor and the clock, and performs reads
pub struct ChannelReader<S, R, C, K> {
    sensor: S,
    row_mux: R,
    col_mux: C,
    clock: K,
    timing: ReadTiming,
    on_failure: ReadFailurePolicy,
    /// Row pattern currently driven and settled, if known
    selected_row: Option<SelectBits>,
}

impl<S, R, C, K> ChannelReader<S, R, C, K>
where
    S: CapacitanceSensor,
    R: Multiplexer,
    C: Multiplexer,
    K: Clock,
{
    /// `row_mux` doubles as the only mux in the single-mux regime
    pub fn new(
        sensor: S,
        row_mux: R,
        col_mux: C,
        clock: K,
        timing: ReadTiming,
        on_failure: ReadFailurePolicy,
    ) -> Self {
        Self {
            sensor,
            row_mux,
            col_mux,
            clock,
            timing,
            on_failure,
            selected_row: None,
        }
    }

    /// Forward the startup configuration to the device
    pub fn configure(&mut self, config: &DeviceConfig) -> bool {
        self.sensor.configure(config)
    }

    /// Drive every select line of `topology` low
    pub fn park(&mut self, topology: &Topology) -> ScanResult<()> {
        self.selected_row = None;
        match *topology {
            Topology::Single { select_lines, .. } => {
                self.row_mux.set_select_lines(SelectBits::zero(select_lines))
            }
            Topology::Grid { row_lines, col_lines, .. } => {
                self.row_mux.set_select_lines(SelectBits::zero(row_lines))?;
                self.col_mux.set_select_lines(SelectBits::zero(col_lines))
            }
            Topology::Direct { .. } => Ok(()),
        }
    }

    /// Steps 1 and 2: address the channel and let it settle
    ///
    /// On grids the row mux is only re-driven when the row changes; a row
    /// that is already selected has already settled.
    pub fn select(&mut self, address: &Address) -> ScanResult<()> {
        match *address {
            Address::Single { lines, .. } => {
                self.selected_row = None;
                self.row_mux.set_select_lines(lines)?;
                self.clock.delay_us(self.timing.row_settle_us);
                self.selected_row = Some(lines);
            }
            Address::Grid { row, col, .. } => {
                if self.selected_row != Some(row) {
                    self.selected_row = None;
                    self.row_mux.set_select_lines(row)?;
                    self.clock.delay_us(self.timing.row_settle_us);
                    self.selected_row = Some(row);
                }
                self.col_mux.set_select_lines(col)?;
                self.clock.delay_us(self.timing.col_settle_us);
            }
            Address::Direct { .. } => {}
        }
        Ok(())
    }

    /// Full read sequence for one channel
    pub fn read(&mut self, address: &Address) -> ScanResult<RawReading> {
        self.select(address)?;
        self.clock.delay_ms(self.timing.conversion_wait_ms);

        let channel = address.device_channel();
        for _ in 0..self.timing.discard_reads {
            let _ = self.read_device(channel)?;
            self.clock.delay_ms(self.timing.discard_spacing_ms);
        }

        self.read_device(channel)
    }

    fn read_device(&mut self, channel: u8) -> ScanResult<RawReading> {
        let attempts = match self.on_failure {
            ReadFailurePolicy::Fail => 0,
            ReadFailurePolicy::Retry { attempts } => attempts,
        };

        let mut retries = 0;
        loop {
            match self.sensor.read_channel(channel) {
                Ok(code) => return RawReading::new(code),
                Err(err) if retries < attempts => {
                    retries += 1;
                    log_warn!("CH{} read failed ({:?}), retry {}/{}", channel, err, retries, attempts);
                    self.clock.delay_ms(self.timing.discard_spacing_ms);
                }
                Err(err) => return Err(err.into_scan_error(channel)),
            }
        }
    }

    pub fn timing(&self) -> &ReadTiming {
        &self.timing
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Give back the sensor, muxes and clock
    pub fn release(self) -> (S, R, C, K) {
        (self.sensor, self.row_mux, self.col_mux, self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::errors::ScanError;
    use crate::mux::{address, AddressPolicy, NoMux};
    use crate::reading::Channel;
    use crate::time::{SimulatedClock, TimeSource};

    /// Sensor that fails a fixed number of times, then returns a constant
    struct Flaky {
        failures: u8,
        reads: u32,
    }

    impl CapacitanceSensor for Flaky {
        fn configure(&mut self, _config: &DeviceConfig) -> bool {
            true
        }

        fn read_channel(&mut self, _channel: u8) -> Result<u32, DeviceError> {
            self.reads += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(DeviceError::Bus);
            }
            Ok(1234)
        }
    }

    fn direct() -> Address {
        address(Channel::Index(0), &Topology::Direct { channels: 1 }, AddressPolicy::Reject).unwrap()
    }

    #[test]
    fn discard_reads_are_taken_and_dropped() {
        let timing = ReadTiming { discard_reads: 3, ..ReadTiming::default() };
        let mut reader = ChannelReader::new(
            Flaky { failures: 0, reads: 0 },
            NoMux,
            NoMux,
            SimulatedClock::new(0),
            timing,
            ReadFailurePolicy::Fail,
        );

        assert_eq!(reader.read(&direct()).map(|r| r.code()), Ok(1234));
        assert_eq!(reader.sensor_mut().reads, 4);
        // conversion wait + three spaced discards, no settle without a mux
        assert_eq!(reader.clock().now(), 10 + 3 * 5);
    }

    #[test]
    fn failure_propagates_by_default() {
        let mut reader = ChannelReader::new(
            Flaky { failures: 1, reads: 0 },
            NoMux,
            NoMux,
            SimulatedClock::new(0),
            ReadTiming::default(),
            ReadFailurePolicy::Fail,
        );
        assert_eq!(
            reader.read(&direct()),
            Err(ScanError::CommunicationFailure { channel: 0 })
        );
    }

    #[test]
    fn retry_policy_recovers() {
        let mut reader = ChannelReader::new(
            Flaky { failures: 2, reads: 0 },
            NoMux,
            NoMux,
            SimulatedClock::new(0),
            ReadTiming { discard_reads: 0, ..ReadTiming::default() },
            ReadFailurePolicy::Retry { attempts: 2 },
        );
        assert_eq!(reader.read(&direct()).map(|r| r.code()), Ok(1234));
        assert_eq!(reader.sensor_mut().reads, 3);
    }

    #[test]
    fn retry_policy_gives_up() {
        let mut reader = ChannelReader::new(
            Flaky { failures: 5, reads: 0 },
            NoMux,
            NoMux,
            SimulatedClock::new(0),
            ReadTiming { discard_reads: 0, ..ReadTiming::default() },
            ReadFailurePolicy::Retry { attempts: 2 },
        );
        assert!(reader.read(&direct()).is_err());
        assert_eq!(reader.sensor_mut().reads, 3);
    }
}
