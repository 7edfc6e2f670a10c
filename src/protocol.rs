//! Wire protocol of the fast-readout firmware.
//!
//! Every request is one line of compact JSON terminated by `\n`, and every
//! reply is one line of JSON. A request carrying `dump: 1` is answered by a
//! JSON line declaring `bytes`, followed immediately by exactly that many raw
//! bytes with no further framing. Reading such a reply is therefore two
//! phases: [`read_line`] then [`read_block`].

use std::io::{ErrorKind, Read, Write};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{DriverError, Result};

/// Line terminator for requests and replies.
pub const TERMINATOR: u8 = b'\n';

/// Largest dump the firmware can produce: its sample buffer holds 32768
/// `u16` points.
pub const MAX_BLOCK_BYTES: usize = 32768 * 2;

/// Chunk size for reading binary blocks.
const BLOCK_CHUNK: usize = 4096;

/// A device reply: always a JSON object.
pub type Response = Map<String, Value>;

/// A request to the device. Unset keys are left off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chans: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<u8>,
}

impl Command {
    pub fn status() -> Self {
        Self {
            status: Some(1),
            ..Default::default()
        }
    }

    pub fn chans(chans: &[u8]) -> Self {
        Self {
            chans: Some(chans.to_vec()),
            ..Default::default()
        }
    }

    pub fn ranges(ranges: &[u8]) -> Self {
        Self {
            ranges: Some(ranges.to_vec()),
            ..Default::default()
        }
    }

    /// Acquire `npts` points into the device buffer.
    pub fn read(npts: u32) -> Self {
        Self {
            npts: Some(npts),
            read: Some(1),
            ..Default::default()
        }
    }

    /// Acquire `npts` points and stream them back as a binary block.
    pub fn read_dump(npts: u32) -> Self {
        Self {
            dump: Some(1),
            ..Self::read(npts)
        }
    }

    /// Print the last acquisition as JSON text.
    pub fn print() -> Self {
        Self {
            print: Some(1),
            ..Default::default()
        }
    }

    pub fn reset() -> Self {
        Self {
            reset: Some(1),
            ..Default::default()
        }
    }

    /// Encode as one request line, terminator included.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(TERMINATOR);
        Ok(line)
    }
}

/// Active channels and their range numbers, as reported in a status reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub chans: Vec<u8>,
    pub ranges: Vec<u8>,
}

impl ChannelConfig {
    pub fn from_response(response: &Response) -> Result<Self> {
        Ok(Self {
            chans: index_list(response, "chans")?,
            ranges: index_list(response, "ranges")?,
        })
    }

    pub fn len(&self) -> usize {
        self.chans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chans.is_empty()
    }
}

fn index_list(response: &Response, key: &str) -> Result<Vec<u8>> {
    let value = response
        .get(key)
        .ok_or_else(|| DriverError::Protocol(format!("status reply has no `{key}` field")))?;
    serde_json::from_value(value.clone()).map_err(|e| {
        DriverError::Protocol(format!("status field `{key}` is not a list of indices: {e}"))
    })
}

/// Byte count announced by a dump reply, bounded by [`MAX_BLOCK_BYTES`].
pub fn declared_bytes(response: &Response) -> Result<usize> {
    let n = response
        .get("bytes")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            DriverError::Protocol("dump reply has no non-negative `bytes` count".to_string())
        })?;
    match usize::try_from(n) {
        Ok(nb) if nb <= MAX_BLOCK_BYTES => Ok(nb),
        _ => Err(DriverError::Protocol(format!(
            "dump reply declares {n} bytes, more than the {MAX_BLOCK_BYTES} the device can hold"
        ))),
    }
}

/// Write one command line and flush.
pub fn write_command<W: Write + ?Sized>(writer: &mut W, command: &Command) -> Result<()> {
    let line = command.to_line()?;
    debug!("tx {}", String::from_utf8_lossy(&line[..line.len() - 1]));
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Read bytes one at a time up to (not including) the next terminator.
///
/// A read that yields nothing before the transport timeout is reported as
/// [`DriverError::Timeout`]; the partial line is included in the message.
pub fn read_line<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Err(line_timeout(&line)),
            Ok(_) => {
                if byte[0] == TERMINATOR {
                    break;
                }
                line.push(byte[0]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Err(line_timeout(&line));
            }
            Err(e) => return Err(e.into()),
        }
    }
    debug!("rx {}", String::from_utf8_lossy(&line));
    Ok(line)
}

fn line_timeout(partial: &[u8]) -> DriverError {
    warn!(
        "Timeout waiting for reply line, already received {:?}",
        String::from_utf8_lossy(partial)
    );
    DriverError::Timeout(format!(
        "no line terminator after {} bytes: {:?}",
        partial.len(),
        String::from_utf8_lossy(partial)
    ))
}

/// Read exactly `nb` bytes. A short read is a timeout, never a short buffer.
///
/// The buffer grows as data arrives, so memory use follows what the device
/// actually sends rather than what it announced.
pub fn read_block<R: Read + ?Sized>(reader: &mut R, nb: usize) -> Result<Vec<u8>> {
    let mut block = Vec::with_capacity(nb.min(BLOCK_CHUNK));
    let mut chunk = [0u8; BLOCK_CHUNK];
    while block.len() < nb {
        let want = (nb - block.len()).min(BLOCK_CHUNK);
        match reader.read(&mut chunk[..want]) {
            Ok(0) => return Err(block_timeout(block.len(), nb)),
            Ok(n) => block.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Err(block_timeout(block.len(), nb));
            }
            Err(e) => return Err(e.into()),
        }
    }
    debug!("rx binary block, {} bytes", nb);
    Ok(block)
}

fn block_timeout(got: usize, nb: usize) -> DriverError {
    warn!("Timeout in binary block: received {got} of {nb} bytes");
    DriverError::Timeout(format!("binary block incomplete: received {got} of {nb} bytes"))
}

/// Parse a reply line. Anything other than a JSON object is rejected.
pub fn parse_response(line: &[u8]) -> Result<Response> {
    match serde_json::from_slice::<Value>(line)? {
        Value::Object(map) => Ok(map),
        other => Err(DriverError::Protocol(format!(
            "expected a JSON object reply, got {other}"
        ))),
    }
}
