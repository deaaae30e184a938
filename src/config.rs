use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;
use crate::scan::DeviceScanner;

/// Environment variable holding a comma-separated list of device paths.
pub const DEVICES_ENV: &str = "SWRNG_DEVICES";

/// Tuning for the retry loop of one command channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Wall-clock budget for one exchange (write, payload, status).
    pub timeout: Duration,
    /// Total attempts per exchange, the first one included.
    pub max_attempts: u32,
    /// Read-and-discard passes made before a retry.
    pub drain_iterations: u32,
    /// Pause between drain passes so in-flight bytes can arrive.
    pub drain_pause: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_attempts: 15,
            drain_iterations: 8,
            drain_pause: Duration::from_millis(10),
        }
    }
}

/// How a multi-device set merges its members' output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CombinePolicy {
    /// Every device contributes to every request; outputs are XORed.
    #[default]
    Xor,
    /// Each request is served whole by the next device in rotation.
    RoundRobin,
}

impl FromStr for CombinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xor" => Ok(CombinePolicy::Xor),
            "round-robin" | "roundrobin" | "rr" => Ok(CombinePolicy::RoundRobin),
            other => Err(format!("unknown combine policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Explicit device paths, in order.
    pub devices: Vec<String>,
    pub policy: CombinePolicy,
    pub channel: ChannelConfig,
}

impl Config {
    pub fn with_devices<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Paths listed in [`DEVICES_ENV`], followed by the explicit ones. When
    /// both are empty the scanner decides.
    pub fn resolve_devices(&self, scanner: &dyn DeviceScanner) -> Result<Vec<String>> {
        let env = std::env::var(DEVICES_ENV).ok();
        self.resolve_with(env.as_deref(), scanner)
    }

    fn resolve_with(&self, env: Option<&str>, scanner: &dyn DeviceScanner) -> Result<Vec<String>> {
        let mut paths = env.map(split_device_list).unwrap_or_default();
        paths.extend(self.devices.iter().cloned());
        if paths.is_empty() {
            paths = scanner.scan()?;
        }
        Ok(paths)
    }
}

pub fn split_device_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<String>);

    impl DeviceScanner for Fixed {
        fn scan(&self) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn split_ignores_blanks() {
        assert_eq!(
            split_device_list(" /dev/a, ,/dev/b,"),
            vec!["/dev/a".to_string(), "/dev/b".to_string()]
        );
        assert!(split_device_list("").is_empty());
    }

    #[test]
    fn env_paths_come_first() {
        let config = Config::with_devices(["/dev/c"]);
        let scanner = Fixed(vec!["/dev/scanned".into()]);
        let paths = config.resolve_with(Some("/dev/a,/dev/b"), &scanner).unwrap();
        assert_eq!(paths, vec!["/dev/a", "/dev/b", "/dev/c"]);
    }

    #[test]
    fn scanner_is_fallback() {
        let config = Config::default();
        let scanner = Fixed(vec!["/dev/scanned".into()]);
        assert_eq!(
            config.resolve_with(None, &scanner).unwrap(),
            vec!["/dev/scanned"]
        );
        assert_eq!(
            config.resolve_with(Some(" , "), &scanner).unwrap(),
            vec!["/dev/scanned"]
        );
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("xor".parse::<CombinePolicy>().unwrap(), CombinePolicy::Xor);
        assert_eq!(
            "Round-Robin".parse::<CombinePolicy>().unwrap(),
            CombinePolicy::RoundRobin
        );
        assert!("majority".parse::<CombinePolicy>().is_err());
        assert_eq!(CombinePolicy::default(), CombinePolicy::Xor);
    }

    #[test]
    fn default_budget() {
        let c = ChannelConfig::default();
        assert_eq!(c.max_attempts, 15);
        assert_eq!(c.timeout, Duration::from_secs(60));
    }
}
