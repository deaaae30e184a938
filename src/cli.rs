use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

use swrng::config::{ChannelConfig, CombinePolicy, Config};

#[derive(Parser, Debug, Clone)]
#[command(name = "swrng", about = "Hardware TRNG reader (SwiftRNG serial protocol)")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Scan for devices and print their identity
    List(ListOpts),
    /// Identity, self-diagnostics and frequency table of one device
    Info(InfoOpts),
    /// Stream random bytes to stdout
    Read(ReadOpts),
    /// Dump one chunk of a raw noise source
    Noise(NoiseOpts),
}

#[derive(Args, Debug, Clone)]
pub struct ChannelOpts {
    /// Wall-clock budget for one exchange, in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
    /// Attempts per exchange before giving up
    #[arg(long, default_value_t = 15)]
    pub attempts: u32,
}

impl ChannelOpts {
    pub fn to_config(&self) -> ChannelConfig {
        ChannelConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.attempts.max(1),
            ..ChannelConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListOpts {
    #[command(flatten)]
    pub channel: ChannelOpts,
}

#[derive(Args, Debug, Clone)]
pub struct InfoOpts {
    /// Serial device path
    #[arg(long)]
    pub dev: String,
    #[command(flatten)]
    pub channel: ChannelOpts,
}

#[derive(Args, Debug, Clone)]
pub struct ReadOpts {
    /// Device path; repeat for several devices. Paths in SWRNG_DEVICES come
    /// first; with neither, devices are scanned for
    #[arg(long = "dev", value_delimiter = ',')]
    pub devs: Vec<String>,
    /// How several devices are merged
    #[arg(long, value_enum, default_value_t = CombinePolicy::Xor)]
    pub policy: CombinePolicy,
    /// Total bytes to emit (0 = until interrupted)
    #[arg(long, default_value_t = 0)]
    pub bytes: u64,
    /// Bytes per request
    #[arg(long, default_value_t = 16_000)]
    pub block: usize,
    /// Write hex text instead of raw bytes
    #[arg(long, default_value_t = false)]
    pub hex: bool,
    /// Throughput log interval in seconds
    #[arg(long, default_value_t = 5.0)]
    pub stats: f64,
    #[command(flatten)]
    pub channel: ChannelOpts,
}

impl ReadOpts {
    pub fn to_config(&self) -> Config {
        Config {
            devices: self.devs.clone(),
            policy: self.policy,
            channel: self.channel.to_config(),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum NoiseSource {
    First,
    Second,
}

#[derive(Args, Debug, Clone)]
pub struct NoiseOpts {
    /// Serial device path
    #[arg(long)]
    pub dev: String,
    #[arg(long, value_enum, default_value_t = NoiseSource::First)]
    pub source: NoiseSource,
    /// Write hex text instead of raw bytes
    #[arg(long, default_value_t = false)]
    pub hex: bool,
    #[command(flatten)]
    pub channel: ChannelOpts,
}
