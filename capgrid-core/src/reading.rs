//! Channel identity and raw converter readings
//!
//! A [`Channel`] names one sensing point, either by flat index or by grid
//! cell. A [`RawReading`] is a validated 28-bit frequency code: higher codes
//! mean a higher tank frequency and therefore *less* capacitance. A
//! [`Measurement`] is one accepted reading as it leaves the scanner.

use core::fmt;

use crate::constants::sensors::RAW_CODE_MAX;
use crate::errors::{ScanError, ScanResult};
use crate::time::Timestamp;

/// Identity of one sensing point
///
/// The set of channels is fixed by configuration and never changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Position on a single multiplexer or a direct device channel
    Index(u16),
    /// Intersection of a row selector and a column selector
    Cell {
        /// Row multiplexer state
        row: u8,
        /// Column multiplexer state
        col: u8,
    },
}

impl Channel {
    pub const fn cell(row: u8, col: u8) -> Self {
        Self::Cell { row, col }
    }

    /// Row/column pair if this is a grid cell
    pub fn as_cell(&self) -> Option<(u8, u8)> {
        match *self {
            Self::Cell { row, col } => Some((row, col)),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "CH{}", index),
            Self::Cell { row, col } => write!(f, "R{}C{}", row, col),
        }
    }
}

/// Validated 28-bit frequency code from the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawReading(u32);

impl RawReading {
    /// Accept a device code, rejecting anything wider than 28 bits
    pub fn new(code: u32) -> ScanResult<Self> {
        if code > RAW_CODE_MAX {
            return Err(ScanError::CodeOutOfRange { code });
        }
        Ok(Self(code))
    }

    pub fn code(&self) -> u32 {
        self.0
    }

    /// A zero code means the oscillator did not run
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RawReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which representation of a reading a consumer works in
///
/// Frequency codes fall as capacitance rises, so anything that compares
/// readings must stay in one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueDomain {
    /// 28-bit frequency codes
    Raw,
    /// Electrode capacitance in picofarads
    #[default]
    Capacitance,
}

/// One accepted reading of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Milliseconds since the scanner started
    pub timestamp_ms: Timestamp,
    /// Channel that was read
    pub channel: Channel,
    /// Code as returned by the device
    pub raw: RawReading,
    /// Converted electrode capacitance, when a converter is configured
    pub capacitance_pf: Option<f64>,
}

impl Measurement {
    /// Reading in `domain`, `None` if capacitance was asked for but not converted
    pub fn value(&self, domain: ValueDomain) -> Option<f64> {
        match domain {
            ValueDomain::Raw => Some(self.raw.code() as f64),
            ValueDomain::Capacitance => self.capacitance_pf,
        }
    }
}
