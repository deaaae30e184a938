//! Discovery of candidate device paths.
//!
//! Naming conventions differ per platform, so they are kept here as plain
//! data instead of leaking into the device code.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Stable symlinks created by udev for the vendor's USB serial devices.
pub const LINUX_BY_ID_DIR: &str = "/dev/serial/by-id";
pub const LINUX_NAME_FRAGMENT: &str = "TectroLabs_SwiftRNG";
/// Call-out devices on macOS.
pub const MACOS_DEV_DIR: &str = "/dev";
pub const MACOS_NAME_PREFIX: &str = "cu.usbmodemSWRNG";

pub trait DeviceScanner {
    /// Candidate paths in a stable order. An empty list is not an error here.
    fn scan(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub enum NamePattern {
    Contains(String),
    Prefix(String),
}

impl NamePattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Contains(s) => name.contains(s.as_str()),
            NamePattern::Prefix(s) => name.starts_with(s.as_str()),
        }
    }
}

/// Lists one directory and keeps the entries whose file name matches.
#[derive(Debug, Clone)]
pub struct DirScanner {
    pub dir: PathBuf,
    pub pattern: NamePattern,
}

impl DirScanner {
    pub fn new(dir: impl Into<PathBuf>, pattern: NamePattern) -> Self {
        Self {
            dir: dir.into(),
            pattern,
        }
    }
}

impl DeviceScanner for DirScanner {
    fn scan(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| Error::Scan {
            dir: self.dir.display().to_string(),
            source,
        })?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::Scan {
                dir: self.dir.display().to_string(),
                source,
            })?;
            let name = entry.file_name();
            if self.pattern.matches(&name.to_string_lossy()) {
                found.push(entry.path().display().to_string());
            }
        }
        found.sort();
        tracing::debug!(dir = %self.dir.display(), count = found.len(), "scanned for devices");
        Ok(found)
    }
}

/// Picks the first platform convention whose directory exists.
#[derive(Debug, Clone)]
pub struct SystemScanner {
    candidates: Vec<DirScanner>,
}

impl SystemScanner {
    pub fn new(candidates: Vec<DirScanner>) -> Self {
        Self { candidates }
    }
}

impl Default for SystemScanner {
    fn default() -> Self {
        Self::new(vec![
            DirScanner::new(
                LINUX_BY_ID_DIR,
                NamePattern::Contains(LINUX_NAME_FRAGMENT.into()),
            ),
            DirScanner::new(
                MACOS_DEV_DIR,
                NamePattern::Prefix(MACOS_NAME_PREFIX.into()),
            ),
        ])
    }
}

impl DeviceScanner for SystemScanner {
    fn scan(&self) -> Result<Vec<String>> {
        match self.candidates.iter().find(|c| c.dir.is_dir()) {
            Some(scanner) => scanner.scan(),
            None => Ok(Vec::new()),
        }
    }
}
