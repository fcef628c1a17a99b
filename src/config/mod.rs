// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! Configuration module

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::codec::RegisterLayout;
use crate::model::MachineConstants;
use crate::streaming::StreamingConfig;

/// Shortest allowed poll interval; faster cadences overwhelm plant RTUs.
pub const MIN_POLL_INTERVAL_SECS: f64 = 0.1;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Register transport configuration
    pub transport: TransportConfig,

    /// Poll loop configuration
    pub acquisition: AcquisitionConfig,

    /// Machine nameplate constants, one entry per generator pair
    pub machines: MachineConfig,

    /// Streaming configuration
    pub streaming: StreamingConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            transport: TransportConfig::default(),
            acquisition: AcquisitionConfig::default(),
            machines: MachineConfig::default(),
            streaming: StreamingConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("fieldwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject configurations the pipeline cannot start from. These are the
    /// only fatal errors in the system.
    pub fn validate(&self) -> Result<()> {
        if self.transport.generator_count == 0 {
            bail!("transport.generator_count must be at least 1");
        }
        let pairs_needed = (self.transport.generator_count as usize).div_ceil(2);
        if self.machines.pairs.len() < pairs_needed {
            bail!(
                "machines.pairs covers {} generator pairs but {} are configured",
                self.machines.pairs.len(),
                pairs_needed
            );
        }
        if self.acquisition.interval_secs < MIN_POLL_INTERVAL_SECS {
            bail!(
                "acquisition.interval_secs {} is below the {}s floor",
                self.acquisition.interval_secs,
                MIN_POLL_INTERVAL_SECS
            );
        }
        Ok(())
    }
}

/// Register transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Modbus TCP host
    pub host: String,

    /// Modbus TCP port
    pub port: u16,

    /// Modbus unit (slave) id
    pub unit_id: u8,

    /// First holding register of the generator block
    pub base_address: u16,

    /// Number of monitored generators
    pub generator_count: u16,

    /// Wire layout of each generator's register block
    pub layout: RegisterLayout,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5020,
            unit_id: 1,
            base_address: 0,
            generator_count: 12,
            layout: RegisterLayout::Wide,
        }
    }
}

/// Poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Seconds between poll cycles
    pub interval_secs: f64,

    /// Cycles in the deviation-ratio rolling window
    pub ratio_window: usize,
}

impl AcquisitionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            ratio_window: 60,
        }
    }
}

/// Machine constants arena, indexed by generator pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Nameplate constants for pair k, covering generators 2k+1 and 2k+2
    pub pairs: Vec<MachineConstants>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        // The reference plant runs six twin-unit pairs of the same model
        Self { pairs: vec![MachineConstants::default(); 6] }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Enable persistence
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Retention period in days
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/fieldwatch.db"),
            retention_days: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_zero_generators_rejected() {
        let mut config = Config::default();
        config.transport.generator_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_constants_arena_rejected() {
        let mut config = Config::default();
        config.machines.pairs.truncate(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sub_floor_interval_rejected() {
        let mut config = Config::default();
        config.acquisition.interval_secs = 0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.transport.generator_count, config.transport.generator_count);
        assert_eq!(back.transport.layout, config.transport.layout);
        assert_eq!(back.machines.pairs.len(), config.machines.pairs.len());
    }
}
