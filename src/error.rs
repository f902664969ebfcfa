//! Error types for the FlexGlove link manager.
//!
//! This module defines all error types that can surface from the link
//! manager, including radio availability, scan, GATT discovery, and
//! platform-level failures.

use thiserror::Error;

/// Main error type for the FlexGlove link manager.
#[derive(Error, Debug)]
pub enum GloveError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Bluetooth adapter unavailable or disabled")]
   RadioUnavailable,

   #[error("BLE scanner not available")]
   ScannerUnavailable,

   #[error("Scan failed: {0}")]
   ScanFailed(i32),

   #[error("Connection timeout")]
   ScanTimedOut,

   #[error("Service not found")]
   ServiceNotFound,

   #[error("Characteristic not found")]
   CharacteristicNotFound,

   #[error("Client configuration descriptor missing")]
   DescriptorMissing,

   #[error("Platform operation failed ({context}): {message}")]
   PlatformOperationFailed {
      context: &'static str,
      message: String,
   },

   #[error("A session is already active")]
   SessionBusy,

   #[error("Session closed")]
   SessionClosed,

   #[error("Discovery scan already in progress")]
   ScanInProgress,

   #[error("Link manager has been shut down")]
   ManagerShutdown,

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

impl GloveError {
   /// Shorthand for [`GloveError::PlatformOperationFailed`] with the given
   /// context tag.
   pub fn platform(context: &'static str, err: impl std::fmt::Display) -> Self {
      Self::PlatformOperationFailed {
         context,
         message: err.to_string(),
      }
   }
}

/// Convenience type alias for Results with `GloveError`.
pub type Result<T> = std::result::Result<T, GloveError>;
