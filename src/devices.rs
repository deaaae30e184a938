use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, info};

use crate::config::{ChannelConfig, CombinePolicy, Config};
use crate::device::DeviceHandle;
use crate::error::{Error, Result};
use crate::port::Transport;
use crate::scan::DeviceScanner;

/// A single random-byte source backed by one or more devices.
#[derive(Debug)]
pub struct DeviceSet {
    devices: Vec<DeviceHandle>,
    policy: CombinePolicy,
    next: AtomicUsize,
}

impl DeviceSet {
    /// Opens every path in order. Nothing stays open if any device fails.
    pub fn open<S: AsRef<str>>(
        paths: &[S],
        policy: CombinePolicy,
        config: &ChannelConfig,
    ) -> Result<Self> {
        Self::open_with(paths, policy, |path| DeviceHandle::open(path, config))
    }

    /// Same as [`DeviceSet::open`] over caller-supplied connections.
    pub fn open_transports<S, F>(
        paths: &[S],
        policy: CombinePolicy,
        config: &ChannelConfig,
        mut connect: F,
    ) -> Result<Self>
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Result<Box<dyn Transport>>,
    {
        Self::open_with(paths, policy, |path| {
            let transport = connect(path).map_err(|e| Error::Init {
                device: path.to_string(),
                source: Box::new(e),
            })?;
            DeviceHandle::with_transport(path, transport, config)
        })
    }

    fn open_with<S, F>(paths: &[S], policy: CombinePolicy, mut open: F) -> Result<Self>
    where
        S: AsRef<str>,
        F: FnMut(&str) -> Result<DeviceHandle>,
    {
        if paths.is_empty() {
            return Err(Error::NoDevices);
        }
        let mut devices = Vec::with_capacity(paths.len());
        for path in paths {
            // an early return drops, and so closes, the handles opened so far
            devices.push(open(path.as_ref())?);
        }
        info!(count = devices.len(), ?policy, "device set ready");
        Ok(Self {
            devices,
            policy,
            next: AtomicUsize::new(0),
        })
    }

    /// Opens whatever the scanner finds.
    pub fn discover(
        scanner: &dyn DeviceScanner,
        policy: CombinePolicy,
        config: &ChannelConfig,
    ) -> Result<Self> {
        let paths = scanner.scan()?;
        Self::open(&paths, policy, config)
    }

    /// Resolves paths from `config` (environment, explicit list, then
    /// scanner) and opens them.
    pub fn from_config(config: &Config, scanner: &dyn DeviceScanner) -> Result<Self> {
        let paths = config.resolve_devices(scanner)?;
        Self::open(&paths, config.policy, &config.channel)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }

    pub fn random_bytes(&self, dest: &mut [u8]) -> Result<()> {
        if let [only] = self.devices.as_slice() {
            return only.random_bytes(dest);
        }
        match self.policy {
            CombinePolicy::Xor => self.xor_combined(dest),
            CombinePolicy::RoundRobin => {
                let i = self.next.fetch_add(1, Ordering::Relaxed) % self.devices.len();
                debug!(device = %self.devices[i].path(), len = dest.len(), "round-robin pick");
                self.devices[i].random_bytes(dest)
            }
        }
    }

    /// Every device fills its own scratch buffer concurrently; the result is
    /// written only once all of them have succeeded.
    fn xor_combined(&self, dest: &mut [u8]) -> Result<()> {
        let len = dest.len();
        let contributions: Vec<Result<Vec<u8>>> = thread::scope(|s| {
            let workers: Vec<_> = self
                .devices
                .iter()
                .map(|device| {
                    s.spawn(move || {
                        let mut scratch = vec![0u8; len];
                        device.random_bytes(&mut scratch).map(|_| scratch)
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut combined = vec![0u8; len];
        for contribution in contributions {
            for (acc, byte) in combined.iter_mut().zip(contribution?) {
                *acc ^= byte;
            }
        }
        dest.copy_from_slice(&combined);
        Ok(())
    }

    pub fn close(self) {
        for device in self.devices {
            device.close();
        }
    }
}
