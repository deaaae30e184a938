//! `rand_core` face of a [`DeviceSet`], for code that wants an `RngCore`.

use rand_core::{CryptoRng, RngCore, impls};

use crate::devices::DeviceSet;
use crate::error::Result;

pub struct SwiftRng {
    devices: DeviceSet,
}

impl SwiftRng {
    pub fn new(devices: DeviceSet) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    pub fn into_inner(self) -> DeviceSet {
        self.devices
    }

    /// The hardware takes no external seed; the bytes are ignored.
    pub fn set_seed(&mut self, _seed: &[u8]) {}

    pub fn generate_seed(&self, len: usize) -> Result<Vec<u8>> {
        let mut seed = vec![0u8; len];
        if len > 0 {
            self.devices.random_bytes(&mut seed)?;
        }
        Ok(seed)
    }

    pub fn fill(&self, dest: &mut [u8]) -> Result<()> {
        self.devices.random_bytes(dest)
    }
}

impl RngCore for SwiftRng {
    fn next_u32(&mut self) -> u32 {
        impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_fill(self)
    }

    /// Panics when the devices fail, as `RngCore` offers no error path here.
    /// Use [`RngCore::try_fill_bytes`] to handle failures.
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(e) = self.fill(dest) {
            panic!("hardware rng failed: {e}");
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill(dest).map_err(rand_core::Error::new)
    }
}

impl CryptoRng for SwiftRng {}
