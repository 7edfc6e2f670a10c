use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("framing error: {0}")]
    Framing(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed")]
    Closed,
}

impl DriverError {
    /// True for errors that by themselves mean the stream stopped mid-reply.
    /// Errors raised after a dump request are also desyncing whatever their
    /// kind; [`Ads8684::is_desynced`](crate::Ads8684::is_desynced) tracks that.
    pub fn is_desync(&self) -> bool {
        matches!(self, DriverError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
