// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed capacities of the driver communication layer.
//!
//! Capacities are read once (TOML or defaults) and turned into preallocated tables by
//! [`crate::Ndev::new`]. Wire-level bounds are constants because both ends of the
//! protocol must agree on them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Max length of a driver label, including the terminating NUL.
pub const LABEL_MAX: usize = 16;
/// Max length of an interface name reported by a driver, including the terminating NUL.
pub const NAME_MAX: usize = 16;
/// Max length of a hardware address.
pub const HWADDR_MAX: usize = 6;
/// Max number of memory segments (and grants) per transfer request.
pub const IOV_MAX: usize = 8;

// Initial sequence numbers are spread as `slot << 21`; more slots would overflow u32.
const MAX_DRIVERS_LIMIT: usize = 1 << 11;
// Queue maxima travel as u8 on the wire.
const MAX_QUEUE_DEPTH: usize = u8::MAX as usize;

/// Errors produced while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read ndev config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ndev config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse ndev config: {0}")]
    Syntax(#[from] toml::de::Error),
    #[error("invalid ndev config: {0}")]
    Invalid(&'static str),
}

/// Capacities of the driver table and the request pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NdevConfig {
    /// Number of driver table slots.
    pub max_drivers: usize,
    /// Guaranteed send/configure queue depth per driver.
    pub sendq_min: usize,
    /// Fixed upper bound (and guarantee) of the receive queue depth per driver.
    pub recvq_max: usize,
    /// Shared send/configure slots any driver may borrow beyond `sendq_min`.
    pub spare_requests: usize,
}

impl Default for NdevConfig {
    fn default() -> Self {
        Self { max_drivers: 8, sendq_min: 2, recvq_max: 2, spare_requests: 8 }
    }
}

impl NdevConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&data)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_drivers == 0 {
            return Err(ConfigError::Invalid("max_drivers must be at least 1"));
        }
        if self.max_drivers > MAX_DRIVERS_LIMIT {
            return Err(ConfigError::Invalid("max_drivers exceeds 2048"));
        }
        if self.sendq_min == 0 || self.recvq_max == 0 {
            return Err(ConfigError::Invalid("queue depths must be at least 1"));
        }
        if self.sendq_min > MAX_QUEUE_DEPTH || self.recvq_max > MAX_QUEUE_DEPTH {
            return Err(ConfigError::Invalid("queue depths must not exceed 255"));
        }
        Ok(())
    }

    /// Total number of request slots preallocated for all drivers.
    pub fn request_slots(&self) -> usize {
        (self.sendq_min + self.recvq_max) * self.max_drivers + self.spare_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_reference_capacities() {
        let config = NdevConfig::default();
        assert_eq!(config.request_slots(), (2 + 2) * 8 + 8);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = NdevConfig::from_toml_str("max_drivers = 3\nspare_requests = 1\n")
            .expect("parse");
        assert_eq!(config.max_drivers, 3);
        assert_eq!(config.spare_requests, 1);
        assert_eq!(config.sendq_min, 2);
        assert_eq!(config.request_slots(), 13);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = NdevConfig::from_toml_str("max_driver = 3\n").expect_err("typo rejected");
        assert!(matches!(err, ConfigError::Syntax(_)));
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let err = NdevConfig::from_toml_str("recvq_max = 0\n").expect_err("zero depth");
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = NdevConfig::from_toml_str("max_drivers = 0\n").expect_err("zero drivers");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn oversized_table_is_rejected() {
        let config = NdevConfig { max_drivers: 4096, ..NdevConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reads_file() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(file, "max_drivers = 2\nsendq_min = 4").expect("write");
        let config = NdevConfig::load(file.path()).expect("load");
        assert_eq!(config.max_drivers, 2);
        assert_eq!(config.sendq_min, 4);
    }

    #[test]
    fn load_reports_path_on_parse_failure() {
        let mut file = NamedTempFile::new().expect("tempfile");
        writeln!(file, "max_drivers = \"many\"").expect("write");
        match NdevConfig::load(file.path()) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("ndev.toml");
        assert!(matches!(NdevConfig::load(&missing), Err(ConfigError::Read { .. })));
    }
}
