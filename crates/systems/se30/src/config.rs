//! Bridge configuration, stored as JSON.

use crate::decode::DEFAULT_SLOTS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Ticks a DMA cycle may wait for /DSACK before it is failed.
pub const DEFAULT_MASTER_TIMEOUT: u32 = 2048;

/// Shortest usable timeout: a target answers /AS one tick later at best, and
/// its /DSACK then needs two synchronizer stages to reach WAIT_ACK.
pub const MIN_MASTER_TIMEOUT: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No slot identifiers configured")]
    NoSlots,
    #[error("Slot ${0:02X} listed more than once")]
    DuplicateSlot(u8),
    #[error("Master timeout of {0} tick(s) is shorter than the /DSACK round trip of 3 ticks")]
    TimeoutTooShort(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Values of A31-A24 this card answers to
    #[serde(default = "default_slots")]
    pub slots: Vec<u8>,
    /// Ticks to wait for /DSACK in master mode; `None` waits forever
    #[serde(default = "default_master_timeout")]
    pub master_timeout: Option<u32>,
}

fn default_slots() -> Vec<u8> {
    DEFAULT_SLOTS.to_vec()
}

fn default_master_timeout() -> Option<u32> {
    Some(DEFAULT_MASTER_TIMEOUT)
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            master_timeout: default_master_timeout(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slots.is_empty() {
            return Err(ConfigError::NoSlots);
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if self.slots[..i].contains(slot) {
                return Err(ConfigError::DuplicateSlot(*slot));
            }
        }
        if let Some(ticks) = self.master_timeout.filter(|&t| t < MIN_MASTER_TIMEOUT) {
            return Err(ConfigError::TimeoutTooShort(ticks));
        }
        Ok(())
    }

    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: BridgeConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.slots, vec![0xF9, 0xFA, 0xFB]);
        assert_eq!(config.master_timeout, Some(DEFAULT_MASTER_TIMEOUT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: BridgeConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config, BridgeConfig::default());

        let config: BridgeConfig =
            serde_json::from_str(r#"{"master_timeout": null}"#).expect("parse");
        assert_eq!(config.master_timeout, None);
    }

    #[test]
    fn test_validation() {
        let mut config = BridgeConfig::default();
        config.slots.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoSlots)));

        config.slots = vec![0xF9, 0xFA, 0xF9];
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateSlot(0xF9))));

        config.slots = vec![0xFE];
        config.master_timeout = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::TimeoutTooShort(0))));
    }

    #[test]
    fn test_timeout_floor() {
        let mut config = BridgeConfig::default();
        for ticks in 1..MIN_MASTER_TIMEOUT {
            config.master_timeout = Some(ticks);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::TimeoutTooShort(t)) if t == ticks
            ));
        }
        config.master_timeout = Some(MIN_MASTER_TIMEOUT);
        assert!(config.validate().is_ok());
        config.master_timeout = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join("pds_se30_config_roundtrip.json");
        let config = BridgeConfig {
            slots: vec![0xFE],
            master_timeout: None,
        };
        config.save(&path).expect("save");
        let loaded = BridgeConfig::load(&path).expect("load");
        assert_eq!(loaded, config);
        fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = std::env::temp_dir().join("pds_se30_config_invalid.json");
        fs::write(&path, r#"{"slots": []}"#).expect("write");
        assert!(matches!(BridgeConfig::load(&path), Err(ConfigError::NoSlots)));
        fs::remove_file(path).ok();
    }
}
