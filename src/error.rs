use std::io;
use std::time::Duration;

use thiserror::Error;

/// Cause of a single failed exchange attempt.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed after {received} of {expected} bytes")]
    Closed { received: usize, expected: usize },
    #[error("device reported status {0:#04x}")]
    Status(u8),
    #[error("exchange exceeded {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no devices")]
    NoDevices,
    #[error("power profile {0} out of range 0..=9")]
    InvalidPowerProfile(u8),
    #[error("buffer of {got} bytes for a {expected}-byte response")]
    LengthMismatch { expected: usize, got: usize },
    #[error("open {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: serialport::Error,
    },
    #[error("scan {dir}: {source}")]
    Scan {
        dir: String,
        #[source]
        source: io::Error,
    },
    #[error("{device}: giving up after {attempts} attempts: {fault}")]
    Exchange {
        device: String,
        attempts: u32,
        #[source]
        fault: Fault,
    },
    #[error("init {device}: {source}")]
    Init {
        device: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Configuration faults are raised before any device I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NoDevices | Error::InvalidPowerProfile(_) | Error::LengthMismatch { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
