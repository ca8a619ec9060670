//! Scan, calibrate, report
//!
//! [`CapacitanceMonitor`] is the whole control loop in one value: it owns the
//! scanner, the baseline calibrator and, optionally, a touch detector. The
//! first call that needs a delta runs calibration to completion, sampling one
//! sweep per calibration interval; only then are delta frames produced.
//!
//! ```rust
//! use capgrid_core::config::SystemConfig;
//! use capgrid_core::device::{CapacitanceSensor, DeviceConfig, DeviceError};
//! use capgrid_core::monitor::CapacitanceMonitor;
//! use capgrid_core::mux::NoMux;
//! use capgrid_core::time::SimulatedClock;
//!
//! struct Constant;
//!
//! impl CapacitanceSensor for Constant {
//!     fn configure(&mut self, _config: &DeviceConfig) -> bool { true }
//!     fn read_channel(&mut self, _channel: u8) -> Result<u32, DeviceError> { Ok(21_587_100) }
//! }
//!
//! let config = SystemConfig::direct_4();
//! let mut monitor = CapacitanceMonitor::new(Constant, NoMux, NoMux, SimulatedClock::new(0), &config)?;
//! let frame = monitor.next_frame()?;
//! assert_eq!(frame.deltas.len(), 4);
//! assert!(frame.deltas.iter().all(|d| d.delta == 0.0));
//! # Ok::<(), capgrid_core::ScanError>(())
//! ```

use heapless::Vec;

use crate::calibration::{Baseline, BaselineCalibrator, DeltaFrame};
use crate::config::SystemConfig;
use crate::constants::buffers::MAX_CHANNELS;
use crate::device::CapacitanceSensor;
use crate::errors::ScanResult;
use crate::mux::Multiplexer;
use crate::output::OutputSink;
use crate::scanner::{GridScanner, ScanCycle};
use crate::time::{Clock, TimeSource};
use crate::touch::{TouchDetector, TouchEvent};

/// Everything one post-calibration sweep produced
#[derive(Debug, Clone)]
pub struct MonitorFrame {
    /// The sweep as read
    pub cycle: ScanCycle,
    /// Deviation of every tracked channel from baseline
    pub deltas: DeltaFrame,
    /// Touch edges, empty without a detector
    pub events: Vec<TouchEvent, MAX_CHANNELS>,
}

/// Scanner, calibrator and touch detector driven as one loop
pub struct CapacitanceMonitor<S, R, C, K> {
    scanner: GridScanner<S, R, C, K>,
    calibrator: BaselineCalibrator,
    touch: Option<TouchDetector>,
    interval_ms: u32,
}

impl<S, R, C, K> CapacitanceMonitor<S, R, C, K>
where
    S: CapacitanceSensor,
    R: Multiplexer,
    C: Multiplexer,
    K: Clock,
{
    /// Validate `config`, bring up the scanner and track every planned channel
    pub fn new(sensor: S, row_mux: R, col_mux: C, clock: K, config: &SystemConfig) -> ScanResult<Self> {
        config.validate()?;
        let scanner = GridScanner::new(sensor, row_mux, col_mux, clock, &config.scan)?;
        let calibrator = BaselineCalibrator::new(&config.calibration, scanner.plan().channels())?;
        let touch = match config.touch {
            Some(touch) => Some(TouchDetector::new(touch)?),
            None => None,
        };

        Ok(Self {
            scanner,
            calibrator,
            touch,
            interval_ms: config.calibration.interval_ms,
        })
    }

    /// Collect sweeps until the baseline is set
    ///
    /// Sweeps start one calibration interval apart; a sweep longer than the
    /// interval is followed immediately by the next one.
    pub fn calibrate(&mut self) -> ScanResult<&Baseline> {
        if !self.calibrator.is_calibrated() {
            log_info!(
                "calibrating {} channels, {} samples",
                self.calibrator.channels().len(),
                self.calibrator.target()
            );
        }

        while !self.calibrator.is_calibrated() {
            let started = self.scanner.clock().now();
            let cycle = self.scanner.scan_cycle()?;
            if self.calibrator.push_cycle(&cycle)? {
                break;
            }
            let elapsed = self.scanner.clock().now().saturating_sub(started);
            let remaining = u64::from(self.interval_ms).saturating_sub(elapsed);
            self.scanner.clock_mut().delay_ms(remaining as u32);
        }
        self.calibrator.baseline()
    }

    /// One sweep with deltas, calibrating first if needed
    pub fn next_frame(&mut self) -> ScanResult<MonitorFrame> {
        self.calibrate()?;

        let cycle = self.scanner.scan_cycle()?;
        let deltas = self.calibrator.deltas(&cycle)?;
        let events = match self.touch.as_mut() {
            Some(detector) => detector.update(&deltas),
            None => Vec::new(),
        };
        self.scanner.pace_cycle();

        Ok(MonitorFrame { cycle, deltas, events })
    }

    /// Report delta frames to `sink`, forever when `frames` is `None`
    ///
    /// Returns the number of frames emitted.
    pub fn run<O: OutputSink + ?Sized>(&mut self, sink: &mut O, frames: Option<u32>) -> ScanResult<u32> {
        let mut emitted = 0;
        while frames.map_or(true, |limit| emitted < limit) {
            let frame = self.next_frame()?;
            sink.emit_deltas(&frame.deltas);
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Discard the baseline; the next frame recalibrates
    pub fn recalibrate(&mut self) {
        self.calibrator.recalibrate();
        if let Some(detector) = self.touch.as_mut() {
            detector.reset();
        }
    }

    pub fn scanner(&self) -> &GridScanner<S, R, C, K> {
        &self.scanner
    }

    pub fn calibrator(&self) -> &BaselineCalibrator {
        &self.calibrator
    }

    pub fn touch(&self) -> Option<&TouchDetector> {
        self.touch.as_ref()
    }

    /// Give back the sensor, muxes and clock
    pub fn release(self) -> (S, R, C, K) {
        self.scanner.release()
    }
}
