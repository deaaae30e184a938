//! Driver for SwiftRNG-style hardware random number generators attached as
//! USB serial devices.
//!
//! ```text
//! DeviceSet -> DeviceHandle -> CommandChannel -> Transport (serial port)
//! ```
//!
//! Each exchange writes one opcode byte and reads a fixed-size payload
//! followed by a status byte. Several devices can be merged into one stream
//! by XOR (default) or served in rotation.

pub mod channel;
pub mod config;
pub mod device;
pub mod devices;
pub mod error;
pub mod port;
pub mod proto;
pub mod rng;
pub mod scan;
pub mod stats;

pub use config::{ChannelConfig, CombinePolicy, Config};
pub use device::DeviceHandle;
pub use devices::DeviceSet;
pub use error::{Error, Fault, Result};
pub use rng::SwiftRng;
pub use scan::{DeviceScanner, SystemScanner};
