//! Host-side driver for the ADS8684 fast-readout acquisition board.
//!
//! The board (a Teensy 4 driving an ADS8684 4-channel 16-bit ADC) accepts
//! newline-delimited JSON commands over USB serial and returns acquisitions
//! either as JSON text or as a raw binary block. This crate handles the
//! transaction protocol and decodes binary blocks into per-channel arrays,
//! optionally calibrated to volts.
//!
//! ```no_run
//! use ads8684::Ads8684;
//!
//! let mut ads = Ads8684::open("/dev/ttyACM0")?;
//! ads.chans(&[0, 1, 2, 3])?;
//! ads.ranges(&[0, 0, 1, 3])?;
//! let volts = ads.read_volts(1000)?;
//! assert_eq!(volts.len(), 4);
//! ads.close();
//! # Ok::<(), ads8684::DriverError>(())
//! ```
//!
//! Python bindings are available with the `python` feature.

mod ads8684;
pub mod calibration;
pub mod decode;
mod errors;
pub mod logging;
pub mod protocol;
#[cfg(feature = "python")]
mod python;

pub use ads8684::{Ads8684, SerialConfig, Transport, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
pub use calibration::Calibration;
pub use decode::Samples;
pub use errors::*;
pub use protocol::{ChannelConfig, Command, Response};
