//! Binary block decoding.
//!
//! A dump block is a flat run of little-endian `u16` codes, interleaved by
//! channel in the order of the status `chans` list:
//! `c0 c1 .. cN-1 c0 c1 .. cN-1 ...`. Decoding deinterleaves it into one row
//! per channel and optionally applies the per-range calibration.

use log::debug;

use crate::calibration::Calibration;
use crate::errors::{DriverError, Result};
use crate::protocol::ChannelConfig;

/// Decoded acquisition, indexed `[channel][sample]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Raw converter codes.
    Codes(Vec<Vec<u16>>),
    /// Calibrated values in volts.
    Volts(Vec<Vec<f64>>),
}

impl Samples {
    pub fn channels(&self) -> usize {
        match self {
            Samples::Codes(rows) => rows.len(),
            Samples::Volts(rows) => rows.len(),
        }
    }

    pub fn samples_per_channel(&self) -> usize {
        match self {
            Samples::Codes(rows) => rows.first().map_or(0, Vec::len),
            Samples::Volts(rows) => rows.first().map_or(0, Vec::len),
        }
    }

    pub fn into_volts(self) -> Option<Vec<Vec<f64>>> {
        match self {
            Samples::Volts(rows) => Some(rows),
            Samples::Codes(_) => None,
        }
    }

    pub fn into_codes(self) -> Option<Vec<Vec<u16>>> {
        match self {
            Samples::Codes(rows) => Some(rows),
            Samples::Volts(_) => None,
        }
    }
}

/// Split `raw` into per-channel code rows.
pub fn unpack_codes(config: &ChannelConfig, raw: &[u8]) -> Result<Vec<Vec<u16>>> {
    let nchans = config.len();
    if nchans == 0 {
        return Err(DriverError::Protocol(
            "status reports no active channels".to_string(),
        ));
    }
    if raw.len() % 2 != 0 {
        return Err(DriverError::Framing(format!(
            "block of {} bytes is not a whole number of 16-bit samples",
            raw.len()
        )));
    }

    let total = raw.len() / 2;
    if total % nchans != 0 {
        return Err(DriverError::Framing(format!(
            "{total} samples do not divide evenly across {nchans} channels"
        )));
    }

    let nsamples = total / nchans;
    let mut rows: Vec<Vec<u16>> = (0..nchans).map(|_| Vec::with_capacity(nsamples)).collect();
    for (i, pair) in raw.chunks_exact(2).enumerate() {
        rows[i % nchans].push(u16::from_le_bytes([pair[0], pair[1]]));
    }
    Ok(rows)
}

/// Apply `calibration` to each row using the range assigned to its channel.
pub fn scale_to_volts(
    config: &ChannelConfig,
    codes: &[Vec<u16>],
    calibration: &Calibration,
) -> Result<Vec<Vec<f64>>> {
    check_ranges(config)?;
    codes
        .iter()
        .zip(&config.ranges)
        .map(|(row, &range)| {
            let scale = calibration.scale(range)?;
            let offset = calibration.offset(range)?;
            Ok(row.iter().map(|&c| c as f64 * scale + offset).collect())
        })
        .collect()
}

/// Full decode: deinterleave, then scale if `volts` is set.
///
/// `npts` is the requested count; the device decides the actual block size,
/// so it is only used for diagnostics here.
pub fn decode(
    config: &ChannelConfig,
    raw: &[u8],
    npts: u32,
    volts: bool,
    calibration: &Calibration,
) -> Result<Samples> {
    check_ranges(config)?;
    let codes = unpack_codes(config, raw)?;
    let per_channel = codes.first().map_or(0, Vec::len);
    debug!(
        "Decoded {} channels x {} samples (requested npts={})",
        codes.len(),
        per_channel,
        npts
    );
    if volts {
        Ok(Samples::Volts(scale_to_volts(config, &codes, calibration)?))
    } else {
        Ok(Samples::Codes(codes))
    }
}

fn check_ranges(config: &ChannelConfig) -> Result<()> {
    if config.ranges.len() != config.chans.len() {
        return Err(DriverError::Protocol(format!(
            "{} ranges reported for {} channels",
            config.ranges.len(),
            config.chans.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chans: &[u8], ranges: &[u8]) -> ChannelConfig {
        ChannelConfig {
            chans: chans.to_vec(),
            ranges: ranges.to_vec(),
        }
    }

    /// Interleaved block where sample `s` of channel `c` has code `c * 1000 + s`.
    fn block(nchans: usize, nsamples: usize) -> Vec<u8> {
        let mut raw = Vec::with_capacity(nchans * nsamples * 2);
        for s in 0..nsamples {
            for c in 0..nchans {
                raw.extend_from_slice(&((c * 1000 + s) as u16).to_le_bytes());
            }
        }
        raw
    }

    #[test]
    fn four_channels_transpose_into_rows() {
        let cfg = config(&[0, 1, 2, 3], &[0, 1, 2, 3]);
        let rows = unpack_codes(&cfg, &block(4, 16)).unwrap();
        assert_eq!(rows.len(), 4);
        for (c, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), 16);
            let expected: Vec<u16> = (0..16).map(|s| (c * 1000 + s) as u16).collect();
            assert_eq!(row, &expected);
        }
    }

    #[test]
    fn little_endian_codes() {
        let cfg = config(&[2], &[3]);
        let rows = unpack_codes(&cfg, &[0x34, 0x12, 0xff, 0xff]).unwrap();
        assert_eq!(rows, vec![vec![0x1234, 0xffff]]);
    }

    #[test]
    fn indivisible_count_is_framing_error() {
        let cfg = config(&[0, 1, 2], &[0, 0, 0]);
        let raw = block(1, 4);
        assert!(matches!(unpack_codes(&cfg, &raw), Err(DriverError::Framing(_))));
    }

    #[test]
    fn odd_byte_count_is_framing_error() {
        let cfg = config(&[0], &[0]);
        assert!(matches!(
            unpack_codes(&cfg, &[1, 2, 3]),
            Err(DriverError::Framing(_))
        ));
    }

    #[test]
    fn no_channels_is_protocol_error() {
        let cfg = config(&[], &[]);
        assert!(matches!(unpack_codes(&cfg, &[]), Err(DriverError::Protocol(_))));
    }

    #[test]
    fn volts_use_each_channels_range() {
        let cal = Calibration::default();
        let cfg = config(&[0, 1], &[0, 4]);
        let raw = [0u8, 0, 0, 0, 0, 0x80, 0, 0x80];
        let out = decode(&cfg, &raw, 2, true, &cal).unwrap();
        assert_eq!(out.channels(), 2);
        assert_eq!(out.samples_per_channel(), 2);
        let rows = out.into_volts().unwrap();
        assert!((rows[0][0] + 10.24).abs() < 1e-9);
        assert!(rows[0][1].abs() < 1e-9);
        assert_eq!(rows[1][0], 0.0);
        assert!((rows[1][1] - 2.56).abs() < 1e-9);
    }

    #[test]
    fn raw_codes_are_unscaled() {
        let cal = Calibration::default();
        let cfg = config(&[0, 1, 2, 3], &[0, 1, 2, 3]);
        let out = decode(&cfg, &block(4, 16), 16, false, &cal).unwrap();
        let rows = out.into_codes().unwrap();
        assert_eq!(rows[3][15], 3015);
    }

    #[test]
    fn bad_range_is_protocol_error() {
        let cal = Calibration::default();
        let cfg = config(&[0], &[5]);
        assert!(matches!(
            decode(&cfg, &block(1, 2), 2, true, &cal),
            Err(DriverError::Protocol(_))
        ));
    }

    #[test]
    fn mismatched_range_list_is_protocol_error() {
        let cal = Calibration::default();
        let cfg = config(&[0, 1], &[0]);
        assert!(matches!(
            decode(&cfg, &block(2, 2), 2, false, &cal),
            Err(DriverError::Protocol(_))
        ));
    }
}
