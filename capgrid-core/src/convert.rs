//! Raw code to capacitance conversion
//!
//! The converter counts the resonant frequency of the sensor's LC tank
//! against its reference clock:
//!
//! ```text
//! fs      = f_ref · code / 2^28
//! C_total = 1 / ((2π·fs)² · L)
//! C_sense = C_total − C_par
//! ```
//!
//! `C_par` lumps the board capacitor and the trace parasitics. `C_sense` can
//! come out negative when the electrode reads below the expected
//! parasitics; that is a real measurement and is passed through unclamped.
//!
//! ```rust
//! use capgrid_core::convert::LcTank;
//! use capgrid_core::RawReading;
//!
//! let tank = LcTank::default();
//! let pf = tank.to_picofarads(RawReading::new(8_000_000)?)?;
//! assert!((pf - 954.2562).abs() < 1e-3);
//! # Ok::<(), capgrid_core::ScanError>(())
//! ```

use core::f64::consts::PI;

use crate::constants::sensors::{
    DEFAULT_INDUCTANCE_H, DEFAULT_PARASITIC_CAPACITANCE_F, DEFAULT_REFERENCE_CLOCK_HZ,
    PICOFARADS_PER_FARAD, RAW_CODE_FULL_SCALE, RAW_CODE_MAX,
};
use crate::errors::{ScanError, ScanResult};
use crate::reading::RawReading;

/// Physical constants of the LC tank and converter clock
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LcTank {
    /// Converter reference clock (Hz)
    pub reference_clock_hz: f64,
    /// Tank inductance (H)
    pub inductance_h: f64,
    /// Fixed board plus parasitic capacitance (F)
    pub parasitic_f: f64,
}

impl Default for LcTank {
    fn default() -> Self {
        Self {
            reference_clock_hz: DEFAULT_REFERENCE_CLOCK_HZ,
            inductance_h: DEFAULT_INDUCTANCE_H,
            parasitic_f: DEFAULT_PARASITIC_CAPACITANCE_F,
        }
    }
}

impl LcTank {
    pub fn new(reference_clock_hz: f64, inductance_h: f64, parasitic_f: f64) -> Self {
        Self { reference_clock_hz, inductance_h, parasitic_f }
    }

    /// Reject constants that would make every conversion meaningless
    pub fn validate(&self) -> ScanResult<()> {
        let finite = self.reference_clock_hz.is_finite()
            && self.inductance_h.is_finite()
            && self.parasitic_f.is_finite();
        if !finite || self.reference_clock_hz <= 0.0 || self.inductance_h <= 0.0 {
            return Err(ScanError::InvalidConfig {
                reason: "LC tank needs a positive reference clock and inductance",
            });
        }
        if self.parasitic_f < 0.0 {
            return Err(ScanError::InvalidConfig { reason: "parasitic capacitance is negative" });
        }
        Ok(())
    }

    /// Sensor oscillation frequency for a code (Hz)
    pub fn frequency_hz(&self, raw: RawReading) -> f64 {
        self.reference_clock_hz * raw.code() as f64 / RAW_CODE_FULL_SCALE as f64
    }

    /// Total tank capacitance for a code (F)
    pub fn total_capacitance_f(&self, raw: RawReading) -> ScanResult<f64> {
        if raw.is_zero() {
            return Err(ScanError::DegenerateConversion);
        }
        let omega = 2.0 * PI * self.frequency_hz(raw);
        Ok(1.0 / (omega * omega * self.inductance_h))
    }

    /// Electrode capacitance for a code (pF), parasitics removed
    pub fn to_picofarads(&self, raw: RawReading) -> ScanResult<f64> {
        let sensed = self.total_capacitance_f(raw)? - self.parasitic_f;
        Ok(sensed * PICOFARADS_PER_FARAD)
    }

    /// Code the converter would report for an electrode of `picofarads`
    ///
    /// Returns `None` when the tank would not resonate inside the 28-bit range
    /// (non-positive total capacitance or a frequency above full scale).
    pub fn code_for_picofarads(&self, picofarads: f64) -> Option<RawReading> {
        let total = picofarads / PICOFARADS_PER_FARAD + self.parasitic_f;
        if !(total > 0.0) {
            return None;
        }
        let fs = 1.0 / (2.0 * PI * libm::sqrt(self.inductance_h * total));
        let code = libm::round(fs * RAW_CODE_FULL_SCALE as f64 / self.reference_clock_hz);
        if code < 1.0 || code > RAW_CODE_MAX as f64 {
            return None;
        }
        RawReading::new(code as u32).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: u32) -> RawReading {
        RawReading::new(code).unwrap()
    }

    #[test]
    fn golden_value() {
        // f_ref = 40 MHz, L = 18 µH, C_par = 36 pF, code = 8,000,000
        let tank = LcTank::new(40_000_000.0, 18e-6, 36e-12);
        let r = raw(8_000_000);

        let fs = tank.frequency_hz(r);
        assert!((fs - 1_192_092.895_507_8).abs() < 1e-3);

        let total_pf = tank.total_capacitance_f(r).unwrap() * 1e12;
        assert!((total_pf - 990.256_174).abs() < 1e-3);

        let sensed = tank.to_picofarads(r).unwrap();
        assert!((sensed - 954.256_174).abs() < 1e-3);
    }

    #[test]
    fn default_tank_matches_reference_board() {
        assert_eq!(LcTank::default(), LcTank::new(40_000_000.0, 18e-6, 36e-12));
    }

    #[test]
    fn zero_code_is_rejected() {
        let tank = LcTank::default();
        assert_eq!(tank.to_picofarads(raw(0)), Err(ScanError::DegenerateConversion));
        assert_eq!(tank.total_capacitance_f(raw(0)), Err(ScanError::DegenerateConversion));
    }

    #[test]
    fn negative_results_pass_through() {
        // Full-scale frequency resonates with well under 36 pF of tank.
        let pf = LcTank::default().to_picofarads(raw(RAW_CODE_MAX)).unwrap();
        assert!(pf < 0.0);
        assert!(pf.is_finite());
    }

    #[test]
    fn inverse_conversion_lands_on_the_same_capacitance() {
        let tank = LcTank::default();
        let code = tank.code_for_picofarads(100.0).unwrap();
        assert_eq!(code.code(), 21_587_100);
        let back = tank.to_picofarads(code).unwrap();
        assert!((back - 100.0).abs() < 1e-3);

        assert!(tank.code_for_picofarads(-40.0).is_none());
    }

    #[test]
    fn constants_validation() {
        assert!(LcTank::default().validate().is_ok());
        assert!(LcTank::new(0.0, 18e-6, 36e-12).validate().is_err());
        assert!(LcTank::new(40e6, f64::NAN, 36e-12).validate().is_err());
        assert!(LcTank::new(40e6, 18e-6, -1e-12).validate().is_err());
    }
}
