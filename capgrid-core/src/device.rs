//! Sensor device port
//!
//! The register-level protocol of the capacitance-to-digital converter lives
//! outside this crate. The engine only needs two capabilities from it:
//! configure once at startup, and read one channel's 28-bit code.
//!
//! # Example Implementation
//!
//! ```ignore
//! struct Fdc2214<I2C> { i2c: I2C, address: u8 }
//!
//! impl<I2C: embedded_hal::i2c::I2c> CapacitanceSensor for Fdc2214<I2C> {
//!     fn configure(&mut self, config: &DeviceConfig) -> bool {
//!         self.write_mux_config(config.autoscan.code(), config.deglitch.code()).is_ok()
//!             && self.device_id_matches()
//!     }
//!
//!     fn read_channel(&mut self, channel: u8) -> Result<u32, DeviceError> {
//!         self.wait_data_ready(channel)?;
//!         self.read_data_word(channel).map_err(|_| DeviceError::Bus)
//!     }
//! }
//! ```

use crate::errors::ScanError;

/// Failure reported by the device for a single read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// No conversion result is available (data-ready never asserted)
    NotReady,
    /// The bus transaction failed or timed out
    Bus,
}

impl DeviceError {
    /// Engine error for a failed read on `channel`
    pub fn into_scan_error(self, channel: u8) -> ScanError {
        match self {
            Self::NotReady => ScanError::DeviceNotReady,
            Self::Bus => ScanError::CommunicationFailure { channel },
        }
    }
}

/// Autoscan (round-robin) sequence of the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoscanMode {
    /// Single channel conversions only
    Disabled = 0b000,
    /// CH0, CH1
    Ch0Ch1 = 0b100,
    /// CH0 through CH2
    Ch0ToCh2 = 0b101,
    /// CH0 through CH3
    Ch0ToCh3 = 0b110,
}

impl AutoscanMode {
    /// Autoscan-enable bit followed by the two sequence bits
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Channels converted by this sequence, as a CHx bit mask
    pub fn channel_mask(&self) -> u8 {
        match self {
            Self::Disabled => 0b0001,
            Self::Ch0Ch1 => 0b0011,
            Self::Ch0ToCh2 => 0b0111,
            Self::Ch0ToCh3 => 0b1111,
        }
    }
}

/// Input deglitch filter bandwidth
///
/// Should sit just above the highest sensor oscillation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Deglitch {
    /// 1 MHz
    Mhz1 = 0b001,
    /// 3.3 MHz
    Mhz3_3 = 0b100,
    /// 10 MHz
    Mhz10 = 0b101,
    /// 33 MHz
    Mhz33 = 0b111,
}

impl Deglitch {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Where the converter's reference clock comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OscillatorSource {
    /// On-chip 43.4 MHz oscillator (nominal)
    Internal,
    /// 40 MHz crystal on CLKIN
    External,
}

/// Startup configuration handed to the device once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    /// Enabled channels, bit n = CHn
    pub channel_mask: u8,
    /// Round-robin sequence
    pub autoscan: AutoscanMode,
    /// Input deglitch bandwidth
    pub deglitch: Deglitch,
    /// Reference clock source
    pub oscillator: OscillatorSource,
}

impl Default for DeviceConfig {
    /// CH0 and CH1 in autoscan, 10 MHz deglitch, external crystal
    fn default() -> Self {
        Self::two_channel()
    }
}

impl DeviceConfig {
    /// CH0 and CH1 in autoscan, 10 MHz deglitch, external crystal
    pub const fn two_channel() -> Self {
        Self {
            channel_mask: 0b0011,
            autoscan: AutoscanMode::Ch0Ch1,
            deglitch: Deglitch::Mhz10,
            oscillator: OscillatorSource::External,
        }
    }

    /// All four channels in autoscan, 10 MHz deglitch, external crystal
    pub const fn four_channel() -> Self {
        Self {
            channel_mask: 0b1111,
            autoscan: AutoscanMode::Ch0ToCh3,
            deglitch: Deglitch::Mhz10,
            oscillator: OscillatorSource::External,
        }
    }

    /// CH0 only, no autoscan, 1 MHz deglitch, internal oscillator
    pub const fn single_channel() -> Self {
        Self {
            channel_mask: 0b0001,
            autoscan: AutoscanMode::Disabled,
            deglitch: Deglitch::Mhz1,
            oscillator: OscillatorSource::Internal,
        }
    }

    /// Whether device channel `channel` is enabled
    pub fn is_enabled(&self, channel: u8) -> bool {
        channel < 8 && self.channel_mask & (1 << channel) != 0
    }
}

/// Capacitance-to-digital converter capability
pub trait CapacitanceSensor {
    /// Apply the startup configuration; `false` means the device is unusable
    fn configure(&mut self, config: &DeviceConfig) -> bool;

    /// Read the latest 28-bit code of `channel`
    ///
    /// May block for a conversion; the engine's settle and discard policy
    /// decides when the result is meaningful.
    fn read_channel(&mut self, channel: u8) -> Result<u32, DeviceError>;
}

impl<S: CapacitanceSensor + ?Sized> CapacitanceSensor for &mut S {
    fn configure(&mut self, config: &DeviceConfig) -> bool {
        (**self).configure(config)
    }

    fn read_channel(&mut self, channel: u8) -> Result<u32, DeviceError> {
        (**self).read_channel(channel)
    }
}
