//! Code-to-volts calibration for the ADS8684 input ranges.
//!
//! The ADC reports 16-bit unsigned codes. Each of the five input ranges maps
//! the full code span linearly onto a voltage window derived from the
//! reference voltage:
//!
//! | range | window            |
//! |-------|-------------------|
//! | 0     | ±2.5 × Vref       |
//! | 1     | ±1.25 × Vref      |
//! | 2     | ±0.625 × Vref     |
//! | 3     | 0 .. 2.5 × Vref   |
//! | 4     | 0 .. 1.25 × Vref  |

use crate::errors::{DriverError, Result};

/// Internal reference voltage of the ADS8684.
pub const INTERNAL_VREF: f64 = 4.096;

/// Number of selectable input ranges.
pub const NUM_RANGES: usize = 5;

/// Full-scale code count of the 16-bit converter.
const FULL_SCALE: f64 = 65536.0;

// Span and bipolar offset per range, in units of Vref.
const GAINS: [f64; NUM_RANGES] = [5.0, 2.5, 1.25, 2.5, 1.25];
const OFFSETS: [f64; NUM_RANGES] = [-2.5, -1.25, -0.625, 0.0, 0.0];

/// Immutable (scale, offset) table indexed by range number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    vref: f64,
    scales: [f64; NUM_RANGES],
    offsets: [f64; NUM_RANGES],
}

impl Default for Calibration {
    fn default() -> Self {
        Self::with_vref(INTERNAL_VREF)
    }
}

impl Calibration {
    /// Build the table for an arbitrary reference voltage (external reference).
    pub fn with_vref(vref: f64) -> Self {
        Self {
            vref,
            scales: std::array::from_fn(|i| GAINS[i] * vref / FULL_SCALE),
            offsets: std::array::from_fn(|i| OFFSETS[i] * vref),
        }
    }

    pub fn vref(&self) -> f64 {
        self.vref
    }

    /// Volts per code for `range`.
    pub fn scale(&self, range: u8) -> Result<f64> {
        Ok(self.scales[Self::index(range)?])
    }

    /// Voltage at code 0 for `range`.
    pub fn offset(&self, range: u8) -> Result<f64> {
        Ok(self.offsets[Self::index(range)?])
    }

    /// Convert a single code.
    #[inline]
    pub fn to_volts(&self, range: u8, code: u16) -> Result<f64> {
        let i = Self::index(range)?;
        Ok(code as f64 * self.scales[i] + self.offsets[i])
    }

    /// Lower and upper voltage bound of `range`.
    pub fn span(&self, range: u8) -> Result<(f64, f64)> {
        let i = Self::index(range)?;
        Ok((self.offsets[i], self.offsets[i] + GAINS[i] * self.vref))
    }

    fn index(range: u8) -> Result<usize> {
        let i = range as usize;
        if i >= NUM_RANGES {
            return Err(DriverError::Protocol(format!(
                "range index {range} out of bounds (expected 0..{NUM_RANGES})"
            )));
        }
        Ok(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn range0_full_scale() {
        let cal = Calibration::default();
        assert!(close(cal.to_volts(0, 0).unwrap(), -10.24));
        let top = cal.to_volts(0, u16::MAX).unwrap();
        assert!(close(top, 10.24 - 5.0 * 4.096 / 65536.0));
        assert!((top - 10.24).abs() < 1e-3);
    }

    #[test]
    fn unipolar_ranges_start_at_zero() {
        let cal = Calibration::default();
        assert_eq!(cal.offset(3).unwrap(), 0.0);
        assert_eq!(cal.offset(4).unwrap(), 0.0);
        assert!(close(cal.scale(4).unwrap(), 1.25 * 4.096 / 65536.0));
    }

    #[test]
    fn spans_match_range_table() {
        let cal = Calibration::default();
        let (lo, hi) = cal.span(2).unwrap();
        assert!(close(lo, -2.56));
        assert!(close(hi, 2.56));
        let (lo, hi) = cal.span(3).unwrap();
        assert!(close(lo, 0.0));
        assert!(close(hi, 10.24));
    }

    #[test]
    fn out_of_range_index_is_protocol_error() {
        let cal = Calibration::default();
        assert!(matches!(cal.scale(5), Err(DriverError::Protocol(_))));
        assert!(matches!(cal.to_volts(255, 0), Err(DriverError::Protocol(_))));
    }

    #[test]
    fn external_reference_scales_linearly() {
        let cal = Calibration::with_vref(5.0);
        assert_eq!(cal.vref(), 5.0);
        assert!(close(cal.offset(0).unwrap(), -12.5));
    }
}
