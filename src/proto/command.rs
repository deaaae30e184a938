use crate::error::{Error, Result};

/// Size of one random-data transfer, the device's atomic unit.
pub const CHUNK_LEN: usize = 16_000;

pub const MAX_POWER_PROFILE: u8 = 9;

/// Every exchange the device understands: one opcode byte out, a fixed
/// number of payload bytes plus one status byte back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // ---- Identity ----
    Model,
    Version,
    SerialNumber,

    // ---- Diagnostics ----
    FrequencyTable,
    SelfDiagnostics,

    // ---- Entropy ----
    RandomBytes,
    FirstNoise,
    SecondNoise,

    // ---- Control ----
    PowerProfile(u8),
}

impl Command {
    /// Builds a power-profile command, rejecting levels the device has no
    /// opcode for.
    pub fn power_profile(level: u8) -> Result<Self> {
        if level > MAX_POWER_PROFILE {
            return Err(Error::InvalidPowerProfile(level));
        }
        Ok(Command::PowerProfile(level))
    }

    pub fn opcode(self) -> u8 {
        match self {
            Command::Model => b'm',
            Command::Version => b'v',
            Command::SerialNumber => b's',
            Command::FrequencyTable => b'f',
            Command::SelfDiagnostics => b'd',
            Command::RandomBytes => b'x',
            Command::FirstNoise => b'<',
            Command::SecondNoise => b'>',
            Command::PowerProfile(level) => b'0' + level,
        }
    }

    pub fn response_len(self) -> usize {
        match self {
            Command::Model => 8,
            Command::Version => 4,
            Command::SerialNumber => 15,
            Command::FrequencyTable => 512,
            Command::RandomBytes | Command::FirstNoise | Command::SecondNoise => CHUNK_LEN,
            Command::SelfDiagnostics | Command::PowerProfile(_) => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_opcode(op: u8) -> Option<Self> {
        Some(match op {
            b'm' => Command::Model,
            b'v' => Command::Version,
            b's' => Command::SerialNumber,
            b'f' => Command::FrequencyTable,
            b'd' => Command::SelfDiagnostics,
            b'x' => Command::RandomBytes,
            b'<' => Command::FirstNoise,
            b'>' => Command::SecondNoise,
            b'0'..=b'9' => Command::PowerProfile(op - b'0'),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table() {
        let table = [
            (Command::Model, b'm', 8),
            (Command::Version, b'v', 4),
            (Command::SerialNumber, b's', 15),
            (Command::FrequencyTable, b'f', 512),
            (Command::RandomBytes, b'x', 16_000),
            (Command::FirstNoise, b'<', 16_000),
            (Command::SecondNoise, b'>', 16_000),
            (Command::SelfDiagnostics, b'd', 0),
        ];
        for (cmd, op, len) in table {
            assert_eq!(cmd.opcode(), op, "{:?}", cmd);
            assert_eq!(cmd.response_len(), len, "{:?}", cmd);
            assert_eq!(Command::from_opcode(op), Some(cmd));
        }
    }

    #[test]
    fn power_profile_encodes_digit() {
        for level in 0..=9u8 {
            let cmd = Command::power_profile(level).unwrap();
            assert_eq!(cmd.opcode(), b'0' + level);
            assert_eq!(cmd.response_len(), 0);
        }
    }

    #[test]
    fn power_profile_out_of_range() {
        assert!(matches!(
            Command::power_profile(10),
            Err(Error::InvalidPowerProfile(10))
        ));
        assert!(matches!(
            Command::power_profile(u8::MAX),
            Err(Error::InvalidPowerProfile(255))
        ));
        assert_eq!(Command::from_opcode(b'q'), None);
    }
}
