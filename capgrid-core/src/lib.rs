//! Scan and calibration engine for multiplexed capacitive electrode grids
//!
//! Samples a capacitance-to-digital converter (FDC2214 class, 28-bit codes)
//! across electrodes switched by analog multiplexers, converts codes to
//! picofarads, establishes a no-touch baseline and reports ΔC and ΔC/C.
//!
//! Key constraints:
//! - Runs on small microcontrollers (`no_std`, no heap)
//! - One blocking control loop; settle and discard timing is the only
//!   thing standing between a reading and the previous electrode's charge
//! - Deterministic sweep order, complete cycles only
//!
//! ```no_run
//! # #[cfg(feature = "std")] {
//! use capgrid_core::config::ScanConfig;
//! use capgrid_core::device::{CapacitanceSensor, DeviceConfig, DeviceError};
//! use capgrid_core::mux::NoMux;
//! use capgrid_core::scanner::GridScanner;
//! use capgrid_core::time::StdClock;
//!
//! struct Bench;
//!
//! impl CapacitanceSensor for Bench {
//!     fn configure(&mut self, _config: &DeviceConfig) -> bool { true }
//!     fn read_channel(&mut self, _channel: u8) -> Result<u32, DeviceError> { Ok(21_587_100) }
//! }
//!
//! let mut scanner = GridScanner::new(Bench, NoMux, NoMux, StdClock::new(), &ScanConfig::direct_4())?;
//! let cycle = scanner.scan_cycle()?;
//! for m in cycle.iter() {
//!     println!("{} {:?} pF", m.channel, m.capacitance_pf);
//! }
//! # }
//! # Ok::<(), capgrid_core::ScanError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(all(test, not(feature = "std")))]
extern crate std;

#[macro_use]
mod macros;

pub mod constants;
pub mod errors;
pub mod time;
pub mod reading;
pub mod mux;
pub mod convert;
pub mod device;
pub mod reader;
pub mod scanner;
pub mod calibration;
pub mod touch;
pub mod output;
pub mod config;
pub mod monitor;

// Public API
pub use errors::{ScanError, ScanResult};
pub use reading::{Channel, Measurement, RawReading, ValueDomain};
pub use mux::{AddressPolicy, Topology};
pub use convert::LcTank;
pub use device::{CapacitanceSensor, DeviceConfig};
pub use scanner::{GridScanner, ScanCycle};
pub use calibration::{BaselineCalibrator, DeltaReading};
pub use output::OutputSink;
pub use config::{ScanConfig, SystemConfig};
pub use monitor::CapacitanceMonitor;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
