//! Startup configuration
//!
//! Everything the engine needs is fixed before the first scan and never
//! changes afterwards. Configurations are plain values: build one from a
//! preset, adjust fields, and call [`SystemConfig::validate`] (the scanner
//! and calibrator validate again on construction).
//!
//! ## Presets
//!
//! | Preset              | Wiring                         | Output        | Calibration      |
//! |---------------------|--------------------------------|---------------|------------------|
//! | `single_mux_8`      | one 8:1 mux on CH0             | per cycle     | 10 × 1 s         |
//! | `grid_8x8`          | row and column 8:1 muxes       | per record    | 10 × 6 s         |
//! | `direct_4`          | CH0..CH3, no mux               | per record    | 20 × 500 ms      |
//! | `baseline_single`   | CH0 only, raw-domain baseline  | deltas        | 200 × 50 ms      |
//!
//! A calibration interval must fit one full sweep
//! ([`ScanConfig::min_sweep_us`]); otherwise the window would stretch
//! past its configured duration.
//!
//! With the `serde` feature every configuration type can be loaded from JSON:
//!
//! ```rust
//! # #[cfg(feature = "serde")] {
//! use capgrid_core::config::SystemConfig;
//!
//! let json = serde_json::to_string(&SystemConfig::grid_8x8()).unwrap();
//! let back: SystemConfig = serde_json::from_str(&json).unwrap();
//! assert_eq!(back, SystemConfig::grid_8x8());
//! # }
//! ```

use crate::constants::buffers::MAX_CALIBRATION_SAMPLES;
use crate::constants::sensors::MUX_8_SELECT_LINES;
use crate::constants::time::{
    CALIBRATION_DURATION_MS, CALIBRATION_INTERVAL_MS, STARTUP_SETTLE_MS, US_PER_MS,
};
use crate::convert::LcTank;
use crate::device::DeviceConfig;
use crate::errors::{ScanError, ScanResult};
use crate::mux::{AddressPolicy, Topology};
use crate::reader::{ReadFailurePolicy, ReadTiming};
use crate::reading::ValueDomain;
use crate::scanner::Pacing;

pub use crate::calibration::CalibrationConfig;
pub use crate::output::{CsvSink, Framing, OutputConfig};
pub use crate::touch::TouchConfig;

/// Wiring, timing and device setup of the scanner
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanConfig {
    /// Electrode wiring
    pub topology: Topology,
    /// Out-of-range index handling
    pub address_policy: AddressPolicy,
    /// Settle and discard policy of every read
    pub timing: ReadTiming,
    pub pacing: Pacing,
    /// Device read failure handling
    pub read_failure: ReadFailurePolicy,
    /// Handed to the device once at startup
    pub device: DeviceConfig,
    /// LC tank constants; `None` reports raw codes only
    pub converter: Option<LcTank>,
    /// Wait after parking the select lines, before the first sweep (ms)
    pub startup_settle_ms: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::grid_8x8()
    }
}

impl ScanConfig {
    fn with_topology(topology: Topology, device: DeviceConfig) -> Self {
        Self {
            topology,
            address_policy: AddressPolicy::Reject,
            timing: ReadTiming::default(),
            pacing: Pacing::default(),
            read_failure: ReadFailurePolicy::Fail,
            device,
            converter: Some(LcTank::default()),
            startup_settle_ms: STARTUP_SETTLE_MS,
        }
    }

    /// Eight electrodes behind one 8:1 mux on CH0
    pub fn single_mux_8() -> Self {
        Self::with_topology(
            Topology::Single { select_lines: MUX_8_SELECT_LINES, channels: 8, device_channel: 0 },
            DeviceConfig::two_channel(),
        )
    }

    /// 8×8 grid, row and column 8:1 muxes feeding CH0
    pub fn grid_8x8() -> Self {
        Self::with_topology(
            Topology::Grid {
                row_lines: MUX_8_SELECT_LINES,
                col_lines: MUX_8_SELECT_LINES,
                rows: 8,
                cols: 8,
                device_channel: 0,
            },
            DeviceConfig::two_channel(),
        )
    }

    /// Four electrodes on CH0..CH3
    pub fn direct_4() -> Self {
        Self::with_topology(Topology::Direct { channels: 4 }, DeviceConfig::four_channel())
    }

    /// One electrode on CH0 with the internal oscillator
    pub fn single_channel() -> Self {
        Self::with_topology(Topology::Direct { channels: 1 }, DeviceConfig::single_channel())
    }

    /// Shortest full sweep these settings allow (µs)
    ///
    /// Every settle, conversion wait, discard spacing and node pause the
    /// reader performs. Bus time of the reads themselves is not counted.
    pub fn min_sweep_us(&self) -> u64 {
        let ms = u64::from(US_PER_MS);
        let t = &self.timing;
        let per_read = (u64::from(t.conversion_wait_ms)
            + u64::from(t.discard_reads) * u64::from(t.discard_spacing_ms)
            + u64::from(self.pacing.node_ms))
            * ms;
        let channels = self.topology.channel_count() as u64;

        let settles = match self.topology {
            Topology::Single { .. } => channels * u64::from(t.row_settle_us),
            // Row-major sweep: one row settle per row, one column settle per cell.
            Topology::Grid { rows, .. } => {
                let row_switches = if rows > 1 { u64::from(rows) } else { 0 };
                row_switches * u64::from(t.row_settle_us) + channels * u64::from(t.col_settle_us)
            }
            Topology::Direct { .. } => 0,
        };
        channels * per_read + settles
    }

    pub fn validate(&self) -> ScanResult<()> {
        self.topology.validate(self.address_policy)?;

        let needed = self.topology.device_channel_mask();
        if needed & !self.device.channel_mask != 0 {
            return Err(ScanError::InvalidConfig {
                reason: "topology reads a device channel that is not enabled",
            });
        }

        if let Some(tank) = &self.converter {
            tank.validate()?;
        }
        Ok(())
    }
}

/// Complete configuration of one monitor
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemConfig {
    pub scan: ScanConfig,
    /// Baseline window and domain
    pub calibration: CalibrationConfig,
    pub output: OutputConfig,
    /// Touch detection on the delta stream, off when `None`
    pub touch: Option<TouchConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::grid_8x8()
    }
}

impl SystemConfig {
    fn with_scan(scan: ScanConfig, framing: Framing, interval_ms: u32, duration_ms: u32) -> Self {
        Self {
            scan,
            calibration: CalibrationConfig { interval_ms, duration_ms, domain: ValueDomain::Capacitance },
            output: OutputConfig { framing, header: true },
            touch: None,
        }
    }

    /// Ten sweeps one second apart (a sweep takes 624 ms)
    pub fn single_mux_8() -> Self {
        Self::with_scan(ScanConfig::single_mux_8(), Framing::PerCycle, 1_000, 10_000)
    }

    /// Ten sweeps six seconds apart (a sweep takes 5056 ms)
    pub fn grid_8x8() -> Self {
        Self::with_scan(ScanConfig::grid_8x8(), Framing::PerRecord, 6_000, 60_000)
    }

    /// Twenty sweeps half a second apart (a sweep takes 280 ms)
    pub fn direct_4() -> Self {
        Self::with_scan(ScanConfig::direct_4(), Framing::PerRecord, 500, 10_000)
    }

    /// Single channel sampled every 50 ms for 10 s, baseline on raw codes
    pub fn baseline_single() -> Self {
        let mut scan = ScanConfig::single_channel();
        scan.pacing.node_ms = 0;
        let mut config =
            Self::with_scan(scan, Framing::PerRecord, CALIBRATION_INTERVAL_MS, CALIBRATION_DURATION_MS);
        config.calibration.domain = ValueDomain::Raw;
        config
    }

    /// CSV sink over `writer` with this configuration's framing and header
    pub fn csv_sink<W: core::fmt::Write>(&self, writer: W) -> CsvSink<W> {
        CsvSink::new(writer, self.output)
    }

    /// Check the whole configuration before anything touches hardware
    pub fn validate(&self) -> ScanResult<()> {
        self.scan.validate()?;
        self.calibration.validate(MAX_CALIBRATION_SAMPLES)?;

        let interval_us = u64::from(self.calibration.interval_ms) * u64::from(US_PER_MS);
        if interval_us < self.scan.min_sweep_us() {
            return Err(ScanError::InvalidConfig {
                reason: "calibration interval shorter than one sweep",
            });
        }

        if self.calibration.domain == ValueDomain::Capacitance && self.scan.converter.is_none() {
            return Err(ScanError::InvalidConfig {
                reason: "capacitance baseline needs LC tank constants",
            });
        }

        if let Some(touch) = &self.touch {
            touch.validate()?;
        }
        Ok(())
    }
}
