//! Median baseline calibration
//!
//! ## Phases
//!
//! ```text
//! Collecting { collected } ──(collected == target)──► Calibrated
//!        ▲                                                │
//!        └──────────────── recalibrate() ─────────────────┘
//! ```
//!
//! While collecting, every pushed scan cycle contributes one sample per
//! tracked channel. `target = floor(duration / interval)`; the transition
//! happens on exactly the cycle that brings the count to `target`, at which
//! point each channel's baseline is the median of its window.
//!
//! Once calibrated the baseline is frozen. Only an explicit
//! [`BaselineCalibrator::recalibrate`] discards it.
//!
//! ## Median Convention
//!
//! Even-length windows use the upper middle element, `sorted[n / 2]`:
//!
//! ```rust
//! use capgrid_core::calibration::median;
//!
//! assert_eq!(median(&mut [5, 1, 3]), Some(3));
//! assert_eq!(median(&mut [4, 2, 6, 8]), Some(6));
//! ```
//!
//! ## Sign Convention
//!
//! | Domain      | delta                 | ratio               |
//! |-------------|-----------------------|---------------------|
//! | Capacitance | `current − baseline`  | `delta / baseline`  |
//! | Raw         | `current − baseline`  | `−delta / baseline` |
//!
//! Either way a touch (more capacitance) gives a positive ratio.

use core::cmp::Ordering;

use heapless::Vec;

use crate::constants::buffers::{MAX_CALIBRATION_SAMPLES, MAX_CHANNELS};
use crate::constants::time::{CALIBRATION_DURATION_MS, CALIBRATION_INTERVAL_MS};
use crate::errors::{ScanError, ScanResult};
use crate::reading::{Channel, Measurement, ValueDomain};
use crate::scanner::ScanCycle;
use crate::time::Timestamp;

/// Sampling schedule and domain of the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationConfig {
    /// Time between calibration samples (ms)
    pub interval_ms: u32,
    /// Length of the calibration window (ms)
    pub duration_ms: u32,
    /// Domain the baseline and deltas are computed in
    pub domain: ValueDomain,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            interval_ms: CALIBRATION_INTERVAL_MS,
            duration_ms: CALIBRATION_DURATION_MS,
            domain: ValueDomain::Capacitance,
        }
    }
}

impl CalibrationConfig {
    /// Samples per channel, `floor(duration / interval)`
    pub fn target_samples(&self) -> usize {
        if self.interval_ms == 0 {
            return 0;
        }
        (self.duration_ms / self.interval_ms) as usize
    }

    /// Check the schedule fits a window of `capacity` samples
    pub fn validate(&self, capacity: usize) -> ScanResult<()> {
        if self.interval_ms == 0 {
            return Err(ScanError::InvalidConfig { reason: "calibration interval is zero" });
        }
        let target = self.target_samples();
        if target == 0 {
            return Err(ScanError::InvalidConfig {
                reason: "calibration window shorter than one interval",
            });
        }
        if target > capacity {
            return Err(ScanError::InvalidConfig {
                reason: "calibration window exceeds sample buffer",
            });
        }
        Ok(())
    }
}

/// Median with the upper-middle tie-break; sorts `values` in place
///
/// Incomparable values (NaN) are treated as equal to everything.
pub fn median<T: Copy + PartialOrd>(values: &mut [T]) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(values[values.len() / 2])
}

/// Population standard deviation
fn spread(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    libm::sqrt(variance)
}

/// Calibrator progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationPhase {
    /// Samples gathered per channel so far
    Collecting {
        /// Completed cycles
        collected: usize,
    },
    /// Baseline is set and frozen
    Calibrated,
}

/// Baseline of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelBaseline {
    /// Tracked channel
    pub channel: Channel,
    /// Median of the window
    pub value: f64,
    /// Standard deviation of the window, the channel's noise floor
    pub spread: f64,
}

/// Frozen per-channel baselines
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    domain: ValueDomain,
    samples: usize,
    channels: Vec<ChannelBaseline, MAX_CHANNELS>,
}

impl Baseline {
    pub fn domain(&self) -> ValueDomain {
        self.domain
    }

    /// Window length each baseline was computed from
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn channels(&self) -> &[ChannelBaseline] {
        &self.channels
    }

    pub fn get(&self, channel: Channel) -> Option<&ChannelBaseline> {
        self.channels.iter().find(|b| b.channel == channel)
    }

    /// Deviation of `measurement` from its channel's baseline
    pub fn delta(&self, measurement: &Measurement) -> ScanResult<DeltaReading> {
        let base = self.get(measurement.channel).ok_or(ScanError::InvalidConfig {
            reason: "channel is not tracked by the calibrator",
        })?;
        let current = measurement.value(self.domain).ok_or(ScanError::InvalidConfig {
            reason: "capacitance baseline needs LC tank constants",
        })?;
        if base.value == 0.0 {
            return Err(ScanError::DegenerateConversion);
        }

        let delta = current - base.value;
        let ratio = match self.domain {
            // Negative baselines are valid; the sign follows the delta.
            ValueDomain::Capacitance => delta / base.value.abs(),
            // Frequency falls as capacitance rises.
            ValueDomain::Raw => -delta / base.value,
        };

        Ok(DeltaReading {
            timestamp_ms: measurement.timestamp_ms,
            channel: measurement.channel,
            current,
            baseline: base.value,
            delta,
            ratio,
        })
    }
}

/// Deviation of one reading from baseline
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaReading {
    /// Timestamp of the underlying measurement (ms)
    pub timestamp_ms: Timestamp,
    /// Channel the reading belongs to
    pub channel: Channel,
    /// Reading in the baseline's domain
    pub current: f64,
    /// Baseline of the channel
    pub baseline: f64,
    /// `current − baseline`
    pub delta: f64,
    /// Normalized change, positive when capacitance increased
    pub ratio: f64,
}

/// Deltas for every tracked channel of one scan cycle
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaFrame {
    sequence: u32,
    readings: Vec<DeltaReading, MAX_CHANNELS>,
}

impl DeltaFrame {
    pub fn from_readings(sequence: u32, readings: &[DeltaReading]) -> ScanResult<Self> {
        let readings = Vec::from_slice(readings)
            .map_err(|_| ScanError::InvalidConfig { reason: "more channels than MAX_CHANNELS" })?;
        Ok(Self { sequence, readings })
    }

    /// Sequence number of the scan cycle the deltas came from
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn readings(&self) -> &[DeltaReading] {
        &self.readings
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeltaReading> {
        self.readings.iter()
    }

    pub fn get(&self, channel: Channel) -> Option<&DeltaReading> {
        self.readings.iter().find(|r| r.channel == channel)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Collects calibration windows and computes deltas against the result
///
/// `S` bounds the window length per channel. The buffers are allocated once
/// for `S` samples and never resized.
pub struct BaselineCalibrator<const S: usize = MAX_CALIBRATION_SAMPLES> {
    domain: ValueDomain,
    target: usize,
    channels: Vec<Channel, MAX_CHANNELS>,
    windows: Vec<Vec<f64, S>, MAX_CHANNELS>,
    phase: CalibrationPhase,
    baseline: Option<Baseline>,
}

impl<const S: usize> BaselineCalibrator<S> {
    /// Track `channels` with the schedule in `config`
    pub fn new<I>(config: &CalibrationConfig, channels: I) -> ScanResult<Self>
    where
        I: IntoIterator<Item = Channel>,
    {
        config.validate(S)?;

        let mut tracked: Vec<Channel, MAX_CHANNELS> = Vec::new();
        let mut windows = Vec::new();
        for channel in channels {
            if tracked.contains(&channel) {
                return Err(ScanError::InvalidConfig { reason: "channel listed twice" });
            }
            tracked
                .push(channel)
                .map_err(|_| ScanError::InvalidConfig { reason: "more channels than MAX_CHANNELS" })?;
            let _ = windows.push(Vec::new());
        }
        if tracked.is_empty() {
            return Err(ScanError::InvalidConfig { reason: "no channels to calibrate" });
        }

        Ok(Self {
            domain: config.domain,
            target: config.target_samples(),
            channels: tracked,
            windows,
            phase: CalibrationPhase::Collecting { collected: 0 },
            baseline: None,
        })
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_calibrated(&self) -> bool {
        self.phase == CalibrationPhase::Calibrated
    }

    /// Samples per channel needed to calibrate
    pub fn target(&self) -> usize {
        self.target
    }

    pub fn domain(&self) -> ValueDomain {
        self.domain
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Add one sample per tracked channel from `cycle`
    ///
    /// Returns `true` on the cycle that completes calibration. Cycles pushed
    /// after calibration are ignored and return `false`.
    pub fn push_cycle(&mut self, cycle: &ScanCycle) -> ScanResult<bool> {
        let collected = match self.phase {
            CalibrationPhase::Collecting { collected } => collected,
            CalibrationPhase::Calibrated => return Ok(false),
        };

        // Resolve every value first so a bad cycle leaves the windows untouched.
        let mut values: Vec<f64, MAX_CHANNELS> = Vec::new();
        for &channel in self.channels.iter() {
            let measurement = cycle.get(channel).ok_or(ScanError::InvalidConfig {
                reason: "tracked channel missing from scan cycle",
            })?;
            let value = measurement.value(self.domain).ok_or(ScanError::InvalidConfig {
                reason: "capacitance baseline needs LC tank constants",
            })?;
            let _ = values.push(value);
        }

        for (window, value) in self.windows.iter_mut().zip(values) {
            window
                .push(value)
                .map_err(|_| ScanError::InvalidConfig { reason: "calibration buffer full" })?;
        }

        let collected = collected + 1;
        if collected < self.target {
            self.phase = CalibrationPhase::Collecting { collected };
            return Ok(false);
        }

        self.finish(collected);
        Ok(true)
    }

    fn finish(&mut self, samples: usize) {
        let mut channels = Vec::new();
        for (&channel, window) in self.channels.iter().zip(self.windows.iter_mut()) {
            let noise = spread(window);
            let value = median(window).unwrap_or(0.0);
            log_info!("baseline {} = {} (spread {})", channel, value, noise);
            let _ = channels.push(ChannelBaseline { channel, value, spread: noise });
            window.clear();
        }

        self.baseline = Some(Baseline { domain: self.domain, samples, channels });
        self.phase = CalibrationPhase::Calibrated;
        log_info!("calibration complete after {} samples", samples);
    }

    /// Frozen baseline, or `BaselineNotYetSet` while collecting
    pub fn baseline(&self) -> ScanResult<&Baseline> {
        self.baseline.as_ref().ok_or(ScanError::BaselineNotYetSet)
    }

    pub fn delta(&self, measurement: &Measurement) -> ScanResult<DeltaReading> {
        self.baseline()?.delta(measurement)
    }

    /// Deltas of every tracked channel in `cycle`, in tracking order
    pub fn deltas(&self, cycle: &ScanCycle) -> ScanResult<DeltaFrame> {
        let baseline = self.baseline()?;
        let mut readings = Vec::new();
        for &channel in self.channels.iter() {
            let measurement = cycle.get(channel).ok_or(ScanError::InvalidConfig {
                reason: "tracked channel missing from scan cycle",
            })?;
            let _ = readings.push(baseline.delta(measurement)?);
        }
        Ok(DeltaFrame { sequence: cycle.sequence(), readings })
    }

    /// Drop the baseline and start a new window
    pub fn recalibrate(&mut self) {
        for window in self.windows.iter_mut() {
            window.clear();
        }
        self.baseline = None;
        self.phase = CalibrationPhase::Collecting { collected: 0 };
        log_info!("recalibration requested, collecting {} samples", self.target);
    }
}
