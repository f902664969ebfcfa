//! Configuration management for the FlexGlove link manager.
//!
//! This module handles loading and saving configuration from disk,
//! including the target device name and default timing parameters.

use std::{env, fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GloveError, Result};

/// Main configuration structure for the link manager.
#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
   /// Advertised name of the glove to connect to.
   #[serde(default = "default_device_name")]
   pub device_name: String,

   /// Fallback open timeout, applied when the caller passes zero.
   #[serde(default = "default_open_timeout_ms")]
   pub open_timeout_ms: u64,

   /// Fallback discovery-scan duration, applied when the caller passes zero.
   #[serde(default = "default_scan_duration_ms")]
   pub scan_duration_ms: u64,
}

fn default_device_name() -> String {
   "FlexGlove-ESP32".to_string()
}

const fn default_open_timeout_ms() -> u64 {
   10_000
}

const fn default_scan_duration_ms() -> u64 {
   5_000
}

impl Default for Config {
   fn default() -> Self {
      Self {
         device_name: default_device_name(),
         open_timeout_ms: default_open_timeout_ms(),
         scan_duration_ms: default_scan_duration_ms(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         let contents = fs::read_to_string(&config_path)?;
         Ok(toml::from_str(&contents)?)
      } else {
         // Create default config
         let config = Self::default();
         config.save()?;
         Ok(config)
      }
   }

   /// Saves the current configuration to disk.
   pub fn save(&self) -> Result<()> {
      let config_path = Self::config_path()?;

      // Ensure directory exists
      if let Some(parent) = config_path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(&config_path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(glove_home) = env::var("FLEXGLOVE_HOME") {
         PathBuf::from(glove_home)
      } else if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else if let Ok(home) = env::var("HOME") {
         PathBuf::from(home).join(".config")
      } else {
         return Err(GloveError::ConfigDirNotFound);
      };

      Ok(config_dir.join("flexglove").join("config.toml"))
   }
}
