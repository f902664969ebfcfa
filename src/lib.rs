//! FlexGlove BLE link manager.
//!
//! Connects to a FlexGlove peripheral over Bluetooth Low Energy: scans for
//! the glove by its advertised name, establishes the GATT connection,
//! enables notifications on the data characteristic, and relays the frames
//! the glove pushes, either to a registered listener or into a pollable
//! buffer.
//!
//! ```no_run
//! use std::sync::Arc;
//! use flexglove_ble::{BluezRadio, Config, GloveLink};
//!
//! # async fn run() -> flexglove_ble::Result<()> {
//! let radio = Arc::new(BluezRadio::new().await?);
//! let link = GloveLink::new(radio, Config::default());
//!
//! let handle = link.open("FlexGlove-ESP32", 10_000).await?;
//! let frames = link.poll(handle, 0).await;
//! println!("{}", hex::encode(frames));
//! link.close(handle).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod link;
pub mod protocol;
pub mod radio;

pub use config::Config;
pub use error::{GloveError, Result};
pub use event::{RxListener, RxSink};
pub use link::{
   manager::GloveLink,
   session::{LinkState, SessionHandle},
};
pub use radio::bluez::BluezRadio;
