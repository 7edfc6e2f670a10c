//! ADS8684 fast-readout driver.
//!
//! The board is a Teensy 4 running firmware that samples an ADS8684 into an
//! on-chip buffer and talks JSON lines over USB serial. This module owns the
//! connection and implements the request/response transaction plus the
//! command set on top of it.
//!
//! # Transactions
//!
//! Each transaction discards whatever is waiting on the input side, writes
//! one request line and reads one reply line. There are no retries: a
//! timeout or malformed reply is returned to the caller and the connection
//! stays open, possibly mid-message. The next transaction starts by
//! discarding input again, so a `reset()` is usually enough to recover.
//!
//! # Timing
//!
//! Every individual read blocks for at most the configured timeout (5 s by
//! default). Multi-step operations such as [`Ads8684::read_binary_mode`] issue
//! several reads, each timed independently.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::{ClearBuffer, SerialPort, SerialPortInfo};

use crate::calibration::Calibration;
use crate::decode::{decode, Samples};
use crate::errors::{DriverError, Result};
use crate::protocol::{
    declared_bytes, parse_response, read_block, read_line, write_command, ChannelConfig,
    Command, Response,
};

// ============================================================================
// Constants
// ============================================================================

/// Nominal baud rate; the Teensy USB CDC link ignores it.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Per-read timeout for serial operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Configuration
// ============================================================================

/// Serial connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// `COMx` on Windows, `/dev/ttyACM0` or similar on Linux.
    pub port: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

// ============================================================================
// Transport Abstraction
// ============================================================================

/// Byte stream the driver talks over.
///
/// Reads must honour a timeout, reporting it either as `Ok(0)` or as an
/// `io::ErrorKind::TimedOut` error.
pub trait Transport: Read + Write + Send {
    /// Drop any bytes received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Driver for one ADS8684 fast-readout board.
///
/// # Example
/// ```no_run
/// use ads8684::Ads8684;
///
/// let mut ads = Ads8684::open("/dev/ttyACM0")?;
/// println!("{:?}", ads.status()?);
/// ads.chans(&[0, 1, 2, 3])?;
/// let volts = ads.read_volts(100)?;
/// println!("channel 0: {:?}", &volts[0][..10]);
/// ads.close();
/// # Ok::<(), ads8684::DriverError>(())
/// ```
pub struct Ads8684 {
    transport: Option<Box<dyn Transport>>,
    calibration: Calibration,
    /// Set when the last operation failed with device output possibly
    /// still in flight.
    desynced: bool,
}

impl Ads8684 {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// Open `port` with default settings.
    pub fn open(port: &str) -> Result<Self> {
        Self::open_with(&SerialConfig::new(port))
    }

    pub fn open_with(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.timeout)
            .open()?;
        info!("Opened {} (timeout {:?})", config.port, config.timeout);
        Ok(Self::with_transport(port))
    }

    /// Wrap an already-open transport.
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Some(Box::new(transport)),
            calibration: Calibration::default(),
            desynced: false,
        }
    }

    /// Replace the calibration table, e.g. for an external reference.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// List serial ports present on this host.
    pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Release the port. Any later command fails with [`DriverError::Closed`].
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            info!("Connection closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// True if the last operation failed part-way through a reply, so the
    /// device may still be sending. The next transaction discards what has
    /// arrived by then, but a `reset()` is the reliable way back.
    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    // ------------------------------------------------------------------------
    // Device Commands
    // ------------------------------------------------------------------------

    /// Verbose device status.
    pub fn status(&mut self) -> Result<Response> {
        self.send(&Command::status())
    }

    /// Typed view of the current channel and range assignment.
    pub fn channel_config(&mut self) -> Result<ChannelConfig> {
        ChannelConfig::from_response(&self.status()?)
    }

    /// Set the list of active channels, e.g. `[0, 1, 2, 3]`.
    pub fn chans(&mut self, chans: &[u8]) -> Result<Response> {
        self.send(&Command::chans(chans))
    }

    /// Set the range number of each active channel, see [`Calibration`].
    pub fn ranges(&mut self, ranges: &[u8]) -> Result<Response> {
        self.send(&Command::ranges(ranges))
    }

    /// Acquire `npts` points and fetch them as JSON text. Slow; meant for
    /// troubleshooting.
    ///
    /// Returns the reply to the acquisition with the `data` field of the
    /// subsequent print reply merged in.
    pub fn read_text_mode(&mut self, npts: u32) -> Result<Response> {
        let mut result = self.send(&Command::read(npts))?;
        let mut printed = self.send(&Command::print())?;
        let data = printed
            .remove("data")
            .ok_or_else(|| DriverError::Protocol("print reply has no `data` field".into()))?;
        result.insert("data".to_string(), data);
        Ok(result)
    }

    /// Acquire `npts` points and fetch them as a binary block.
    ///
    /// The current status is fetched first so that the block can be split
    /// by channel. With `volts` set the rows are calibrated, otherwise raw
    /// codes are returned.
    pub fn read_binary_mode(&mut self, npts: u32, volts: bool) -> Result<Samples> {
        let config = self.channel_config()?;

        // Any failure between the dump request and the end of the block
        // leaves raw bytes on the stream.
        let raw = self
            .fetch_block(npts, config.len())
            .inspect_err(|_| self.desynced = true)?;

        decode(&config, &raw, npts, volts, &self.calibration)
    }

    /// [`read_binary_mode`](Self::read_binary_mode) scaled to volts.
    pub fn read_volts(&mut self, npts: u32) -> Result<Vec<Vec<f64>>> {
        let samples = self.read_binary_mode(npts, true)?;
        samples
            .into_volts()
            .ok_or_else(|| DriverError::Protocol("decoder returned raw codes".into()))
    }

    /// [`read_binary_mode`](Self::read_binary_mode) as raw codes.
    pub fn read_codes(&mut self, npts: u32) -> Result<Vec<Vec<u16>>> {
        let samples = self.read_binary_mode(npts, false)?;
        samples
            .into_codes()
            .ok_or_else(|| DriverError::Protocol("decoder returned volts".into()))
    }

    /// Reset the device; returns its status afterwards.
    pub fn reset(&mut self) -> Result<Response> {
        self.send(&Command::reset())
    }

    /// One transaction: discard stale input, write `command`, read the reply.
    pub fn send(&mut self, command: &Command) -> Result<Response> {
        let transport = self.transport()?;
        transport.discard_input()?;
        self.desynced = false;
        let result = self.exchange(command);
        if let Err(e) = &result {
            self.desynced = e.is_desync();
        }
        result
    }

    // ------------------------------------------------------------------------
    // Internal Methods
    // ------------------------------------------------------------------------

    fn exchange(&mut self, command: &Command) -> Result<Response> {
        let transport = self.transport()?;
        write_command(transport, command)?;
        let line = read_line(transport)?;
        parse_response(&line)
    }

    /// Dump phase of a binary read: the reply announces the block size and
    /// the block follows it directly on the stream.
    fn fetch_block(&mut self, npts: u32, nchans: usize) -> Result<Vec<u8>> {
        let reply = self.send(&Command::read_dump(npts))?;
        let nb = declared_bytes(&reply)?;
        debug!("Expecting {} binary bytes for {} channels", nb, nchans);
        read_block(self.transport()?, nb)
    }

    fn transport(&mut self) -> Result<&mut (dyn Transport + 'static)> {
        self.transport.as_deref_mut().ok_or(DriverError::Closed)
    }
}
