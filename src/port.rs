use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::{Error, Result};

/// Per-read timeout. The exchange deadline lives in the channel; this only
/// bounds how long a single `read` may park.
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const BAUD: u32 = 115_200;

/// Byte-level connection to one device.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Reads whatever is available, possibly fewer bytes than `buf` holds.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Reads and throws away bytes already waiting on the connection.
    fn discard_pending(&mut self) -> io::Result<usize>;
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

/// Opens a device endpoint. On Unix the port is taken in exclusive mode and
/// released when the transport is dropped.
pub fn open_serial(path: &str) -> Result<SerialTransport> {
    let port = serialport::new(path, BAUD)
        .timeout(READ_TIMEOUT)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open()
        .map_err(|source| Error::Open {
            device: path.to_string(),
            source,
        })?;
    Ok(SerialTransport { port })
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn discard_pending(&mut self) -> io::Result<usize> {
        let pending = self.port.bytes_to_read()? as usize;
        let mut scratch = [0u8; 512];
        let mut left = pending;
        while left > 0 {
            let take = left.min(scratch.len());
            let n = self.port.read(&mut scratch[..take])?;
            if n == 0 {
                break;
            }
            left -= n;
        }
        Ok(pending - left)
    }
}
