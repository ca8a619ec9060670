//! Error Types for Scanning, Conversion and Calibration
//!
//! ## Design Philosophy
//!
//! The scan engine runs inside a tight control loop on small microcontrollers,
//! so its errors follow the same rules as the rest of the crate:
//!
//! 1. **No Heap Allocation**: every variant carries inline data or a
//!    `&'static str` reason.
//!
//! 2. **Copy Semantics**: errors are returned from the hot read path and can be
//!    stored or compared without moves.
//!
//! 3. **Fail Loudly**: there is no degraded scanning mode. Any variant returned
//!    from startup halts the system before a single record is emitted.
//!
//! ## Error Categories
//!
//! ### Device
//! - `DeviceNotReady`: `configure()` returned false, or the converter reported
//!   not-ready during a read
//! - `CommunicationFailure`: the bus transaction for a channel failed
//! - `CodeOutOfRange`: the device produced a code wider than 28 bits
//!
//! ### Addressing
//! - `AddressOutOfRange`: a channel does not fit the multiplexer address space
//! - `SelectLineFault`: a select line refused to take a level
//!
//! ### Numeric
//! - `DegenerateConversion`: a zero code cannot be turned into a capacitance
//!
//! ### Sequencing and setup
//! - `BaselineNotYetSet`: a delta was requested while the baseline is collecting
//! - `InvalidConfig`: the configuration is self-contradictory
//!
//! ## Error Handling Strategy
//!
//! ```rust
//! use capgrid_core::ScanError;
//!
//! fn on_startup_failure(err: ScanError) {
//!     match err {
//!         ScanError::DeviceNotReady => {
//!             // check wiring and the I2C address, nothing will be scanned
//!         }
//!         ScanError::InvalidConfig { reason } => {
//!             // fix the configuration named by `reason`
//!             let _ = reason;
//!         }
//!         _ => {
//!             // any other startup error is also fatal
//!         }
//!     }
//! }
//! # on_startup_failure(ScanError::DeviceNotReady);
//! ```

use thiserror_no_std::Error;

/// Result type for scan, conversion and calibration operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors raised by the scan engine
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ScanError {
    /// The capacitance converter is not ready (failed configuration or data not ready)
    #[error("Sensor device not ready")]
    DeviceNotReady,

    /// Reading a device channel failed on the bus
    #[error("Communication failure reading device channel {channel}")]
    CommunicationFailure {
        /// Device channel that was being read
        channel: u8,
    },

    /// A zero code would divide by zero in the LC resonance relation
    #[error("Cannot convert a zero frequency code to capacitance")]
    DegenerateConversion,

    /// Channel index does not fit the multiplexer address space
    #[error("Channel index {index} outside address space of {capacity}")]
    AddressOutOfRange {
        /// Requested index (row, column or flat index)
        index: u16,
        /// Number of addressable positions on that selector
        capacity: u16,
    },

    /// Deltas were requested before calibration finished collecting
    #[error("Baseline has not been established yet")]
    BaselineNotYetSet,

    /// Device returned a code that does not fit in 28 bits
    #[error("Raw code {code:#x} exceeds 28-bit range")]
    CodeOutOfRange {
        /// Offending code as returned by the device
        code: u32,
    },

    /// A multiplexer select line could not be driven
    #[error("Multiplexer select line fault")]
    SelectLineFault,

    /// Configuration is inconsistent
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration
        reason: &'static str,
    },
}

impl ScanError {
    /// True for errors that originate in the sensor device rather than in
    /// configuration or sequencing
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotReady | Self::CommunicationFailure { .. } | Self::CodeOutOfRange { .. }
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ScanError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::DeviceNotReady =>
                defmt::write!(fmt, "Device not ready"),
            Self::CommunicationFailure { channel } =>
                defmt::write!(fmt, "Communication failure on CH{}", channel),
            Self::DegenerateConversion =>
                defmt::write!(fmt, "Zero code conversion"),
            Self::AddressOutOfRange { index, capacity } =>
                defmt::write!(fmt, "Index {} outside {} positions", index, capacity),
            Self::BaselineNotYetSet =>
                defmt::write!(fmt, "Baseline not set"),
            Self::CodeOutOfRange { code } =>
                defmt::write!(fmt, "Code {=u32:#x} exceeds 28 bits", code),
            Self::SelectLineFault =>
                defmt::write!(fmt, "Select line fault"),
            Self::InvalidConfig { reason } =>
                defmt::write!(fmt, "Invalid config: {}", reason),
        }
    }
}
