use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{info, trace};

use crate::channel::CommandChannel;
use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::port::{Transport, open_serial};
use crate::proto::command::{CHUNK_LEN, Command, MAX_POWER_PROFILE};

/// Leftover bytes of the last chunk fetched for a sub-chunk request.
struct ReadAhead {
    data: Box<[u8]>,
    cursor: usize,
}

impl ReadAhead {
    fn empty() -> Self {
        Self {
            data: vec![0u8; CHUNK_LEN].into_boxed_slice(),
            cursor: CHUNK_LEN,
        }
    }
}

/// One opened, identified and self-tested device.
pub struct DeviceHandle {
    path: String,
    channel: CommandChannel,
    model: String,
    version: String,
    serial_number: String,
    read_ahead: Mutex<ReadAhead>,
}

impl DeviceHandle {
    pub fn open(path: &str, config: &ChannelConfig) -> Result<Self> {
        let transport = open_serial(path).map_err(|e| Error::Init {
            device: path.to_string(),
            source: Box::new(e),
        })?;
        Self::with_transport(path, Box::new(transport), config)
    }

    /// Runs the start-up sequence over an already opened connection. On
    /// failure the connection is dropped before the error is returned.
    pub fn with_transport(
        path: &str,
        transport: Box<dyn Transport>,
        config: &ChannelConfig,
    ) -> Result<Self> {
        let channel = CommandChannel::new(path, transport, config.clone());
        Self::initialize(path, channel).map_err(|e| Error::Init {
            device: path.to_string(),
            source: Box::new(e),
        })
    }

    fn initialize(path: &str, channel: CommandChannel) -> Result<Self> {
        channel.drain();
        let model = query_string(&channel, Command::Model)?;
        let version = query_string(&channel, Command::Version)?;
        let serial_number = query_string(&channel, Command::SerialNumber)?;
        let device = Self {
            path: path.to_string(),
            channel,
            model,
            version,
            serial_number,
            read_ahead: Mutex::new(ReadAhead::empty()),
        };
        device.set_power_profile(MAX_POWER_PROFILE)?;
        device.self_diagnostics()?;
        info!(device = %device, "device ready");
        Ok(device)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn frequency_table(&self) -> Result<Vec<u8>> {
        self.fetch(Command::FrequencyTable)
    }

    pub fn self_diagnostics(&self) -> Result<()> {
        self.channel.execute(Command::SelfDiagnostics, &mut [])
    }

    pub fn set_power_profile(&self, level: u8) -> Result<()> {
        let cmd = Command::power_profile(level)?;
        self.channel.execute(cmd, &mut [])
    }

    pub fn first_noise(&self) -> Result<Vec<u8>> {
        self.fetch(Command::FirstNoise)
    }

    pub fn second_noise(&self) -> Result<Vec<u8>> {
        self.fetch(Command::SecondNoise)
    }

    fn fetch(&self, cmd: Command) -> Result<Vec<u8>> {
        let mut out = vec![0u8; cmd.response_len()];
        self.channel.execute(cmd, &mut out)?;
        Ok(out)
    }

    /// Fills `dest` with random bytes.
    ///
    /// Whole chunks go straight from the device into `dest`. The tail is
    /// served from a per-device read-ahead buffer so small requests share
    /// one fetched chunk.
    pub fn random_bytes(&self, dest: &mut [u8]) -> Result<()> {
        let mut chunks = dest.chunks_exact_mut(CHUNK_LEN);
        for chunk in &mut chunks {
            self.channel.execute(Command::RandomBytes, chunk)?;
        }
        let tail = chunks.into_remainder();
        if tail.is_empty() {
            return Ok(());
        }

        let mut ahead = self.read_ahead.lock().unwrap_or_else(PoisonError::into_inner);
        let mut filled = 0;
        while filled < tail.len() {
            if ahead.cursor == CHUNK_LEN {
                trace!(device = %self.path, "refilling read-ahead buffer");
                self.channel.execute(Command::RandomBytes, &mut ahead.data)?;
                ahead.cursor = 0;
            }
            let n = (CHUNK_LEN - ahead.cursor).min(tail.len() - filled);
            let start = ahead.cursor;
            tail[filled..filled + n].copy_from_slice(&ahead.data[start..start + n]);
            ahead.cursor += n;
            filled += n;
        }
        Ok(())
    }

    pub fn close(self) {
        info!(device = %self.path, "closing device");
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (model={}, version={}, serial={})",
            self.path, self.model, self.version, self.serial_number
        )
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("path", &self.path)
            .field("model", &self.model)
            .field("version", &self.version)
            .field("serial_number", &self.serial_number)
            .finish_non_exhaustive()
    }
}

fn query_string(channel: &CommandChannel, cmd: Command) -> Result<String> {
    let mut raw = vec![0u8; cmd.response_len()];
    channel.execute(cmd, &mut raw)?;
    Ok(String::from_utf8_lossy(&raw)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string())
}
