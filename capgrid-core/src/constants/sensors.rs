//! Sensor Specifications and LC Tank Defaults
//!
//! The converter measures the resonant frequency of an LC tank whose
//! capacitor is the sensing electrode. These constants describe the converter
//! word and the tank components fitted on the reference board.

// ===== CONVERTER WORD =====

/// Full-scale divisor of the 28-bit frequency code (2^28).
///
/// `f_sensor = f_ref * code / RAW_CODE_FULL_SCALE`
///
/// Source: FDC2214 datasheet, DATA_CHx conversion equation
pub const RAW_CODE_FULL_SCALE: u32 = 1 << 28;

/// Largest valid 28-bit frequency code.
pub const RAW_CODE_MAX: u32 = RAW_CODE_FULL_SCALE - 1;

/// Number of conversion channels on the device (CH0..CH3).
///
/// Source: FDC2214 datasheet (the FDC2212 only populates CH0 and CH1)
pub const DEVICE_CHANNELS: u8 = 4;

// ===== LC TANK =====

/// Reference clock of the converter (Hz).
///
/// 40 MHz from either the internal oscillator or the external crystal.
pub const DEFAULT_REFERENCE_CLOCK_HZ: f64 = 40_000_000.0;

/// Tank inductance (H).
///
/// 18 µH shielded SMD inductor on the reference board.
pub const DEFAULT_INDUCTANCE_H: f64 = 18e-6;

/// Everything in the tank that is not the electrode (F).
///
/// 33 pF board capacitor plus 3 pF of trace and pin parasitics, written as
/// one literal so it is exactly 36e-12. Subtracted from the resonant
/// capacitance to isolate the sensed value.
pub const DEFAULT_PARASITIC_CAPACITANCE_F: f64 = 36e-12;

/// Farads to picofarads.
pub const PICOFARADS_PER_FARAD: f64 = 1e12;

// ===== MULTIPLEXERS =====

/// Widest select bus supported for one multiplexer (256:1).
///
/// The 8:1 SN74HC4051 uses 3 lines (C B A == S2 S1 S0, S0 is the LSB).
pub const MAX_SELECT_LINES: u8 = 8;

/// Select lines of the 8:1 analog multiplexers used on the reference rigs.
pub const MUX_8_SELECT_LINES: u8 = 3;
