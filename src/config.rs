//! Device configuration.

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::ib::av::IbRate;
use crate::ib::type_alias::MAX_PAYLOAD_SIZE;

/// Sizing of the management interfaces created when a device opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MiConfig {
    /// Completion queue depth of each management interface.
    pub num_cqes: usize,

    /// Send work queue depth of each management interface.
    pub num_send_wqes: usize,

    /// Receive work queue depth of each management interface.
    pub num_recv_wqes: usize,
}

impl Default for MiConfig {
    fn default() -> Self {
        Self {
            num_cqes: 8,
            num_send_wqes: 4,
            num_recv_wqes: 2,
        }
    }
}

/// Per-device configuration of the Infiniband core.
///
/// Loaded from the `[ibcore]` table of a TOML file, e.g.:
///
/// ```toml
/// [ibcore]
/// max_payload_size = 2048
/// default_rate = "10"
///
/// [ibcore.mi]
/// num_recv_wqes = 4
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct IbConfig {
    /// Receive buffers must have at least this much tailroom, and refill
    /// allocates buffers of exactly this size.
    pub max_payload_size: usize,

    /// Rate filled into address vectors that do not specify one.
    pub default_rate: IbRate,

    /// Management interface sizing.
    pub mi: MiConfig,
}

impl Default for IbConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            default_rate: IbRate::Rate2_5,
            mi: MiConfig::default(),
        }
    }
}

/// Configuration loading error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file")]
    IoError(#[from] io::Error),

    /// The configuration file is not valid TOML or has mistyped fields.
    #[error("bad configuration: {0}")]
    TomlError(#[from] toml::de::Error),
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    ibcore: IbConfig,
}

impl IbConfig {
    /// Parse the `[ibcore]` table of a TOML document.
    /// A document without the table yields the default configuration.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        Ok(file.ibcore)
    }

    /// Load the `[ibcore]` table of a TOML file.
    pub fn load_toml(config_file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_str = fs::read_to_string(config_file)?;
        Self::from_toml_str(&toml_str)
    }
}
