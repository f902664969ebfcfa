//! Platform radio capability contract.
//!
//! The link manager never talks to a Bluetooth stack directly; it consumes
//! the capability traits defined here. The production implementation lives
//! in [`bluez`], and the test suite drives the manager through an in-memory
//! fake. All platform events are delivered asynchronously over `mpsc`
//! channels, matching how every real BLE stack reports scan results,
//! connection-state changes, and characteristic notifications.

use std::sync::Arc;

use smallvec::SmallVec;
use smol_str::SmolStr;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

pub mod bluez;

#[cfg(test)]
pub(crate) mod fake;

/// Raw notification payload. Glove frames are small; 32 bytes covers the
/// common case without a heap allocation.
pub type Packet = SmallVec<[u8; 32]>;

pub type ScannerRef = Arc<dyn LeScanner>;
pub type PeripheralRef = Arc<dyn Peripheral>;
pub type GattLinkRef = Arc<dyn GattLink>;
pub type GattProfileRef = Arc<dyn GattProfile>;
pub type GattServiceRef = Arc<dyn GattService>;
pub type CharacteristicRef = Arc<dyn GattCharacteristic>;
pub type DescriptorRef = Arc<dyn GattDescriptor>;

/// Events produced by an in-flight scan.
#[derive(Clone)]
pub enum ScanEvent {
   /// An advertisement was seen. Carries the capability handle for the
   /// advertising device.
   Advertisement { device: PeripheralRef },
   /// The platform scan primitive failed to start or aborted.
   Failed(i32),
}

/// Events produced by a GATT connection.
#[derive(Clone)]
pub enum GattEvent {
   /// The link-layer connection state changed.
   ConnectionChanged { connected: bool },
   /// Service enumeration completed; carries the lookup capability.
   ServicesDiscovered(GattProfileRef),
   /// The peripheral pushed a characteristic value.
   CharacteristicChanged { uuid: Uuid, value: Packet },
}

/// Entry point into the platform Bluetooth stack.
///
/// Absence of hardware or a disabled radio is reported through the return
/// values, never raised as an error.
pub trait RadioStack: Send + Sync {
   /// True iff BLE hardware is present, powered, and enabled.
   fn is_enabled(&self) -> bool;

   /// Returns a fresh scanner capability, or `None` when scanning is not
   /// available on this stack.
   fn scanner(&self) -> Option<ScannerRef>;
}

/// A single-use low-energy scanner.
pub trait LeScanner: Send + Sync {
   /// Starts scanning. With `filter` set, only advertisements whose device
   /// name equals the filter are delivered. Events arrive on `sink` until
   /// [`LeScanner::stop`] is called or the sink is dropped.
   fn start(&self, filter: Option<&str>, sink: mpsc::Sender<ScanEvent>) -> Result<()>;

   /// Stops the scan. Idempotent; stopping a never-started or already
   /// stopped scanner is a no-op.
   fn stop(&self);
}

/// Capability handle for an advertising device, as supplied by the platform.
pub trait Peripheral: Send + Sync {
   /// Advertised device name, if the advertisement carried one.
   fn name(&self) -> Option<SmolStr>;

   /// Issues an asynchronous GATT connect. Connection-state changes, the
   /// discovery-completed event, and characteristic notifications are all
   /// delivered on `sink`.
   fn connect(&self, sink: mpsc::Sender<GattEvent>) -> Result<GattLinkRef>;
}

/// An established (or establishing) GATT connection.
pub trait GattLink: Send + Sync {
   /// Requests service enumeration; completion arrives as
   /// [`GattEvent::ServicesDiscovered`].
   fn discover_services(&self) -> Result<()>;

   /// Tears the connection down. Platform-level failures are logged by the
   /// implementation, never raised, so teardown always completes.
   fn disconnect(&self);
}

/// Service/characteristic lookup capability produced by discovery.
pub trait GattProfile: Send + Sync {
   fn service(&self, uuid: Uuid) -> Option<GattServiceRef>;
}

pub trait GattService: Send + Sync {
   fn uuid(&self) -> Uuid;
   fn characteristic(&self, uuid: Uuid) -> Option<CharacteristicRef>;
}

pub trait GattCharacteristic: Send + Sync {
   fn uuid(&self) -> Uuid;
   fn descriptor(&self, uuid: Uuid) -> Option<DescriptorRef>;

   /// Enables or disables local notification delivery for this
   /// characteristic. Fire-and-forget: the request is issued and the call
   /// returns without waiting for platform acknowledgment.
   fn set_notifying(&self, enabled: bool) -> Result<()>;
}

pub trait GattDescriptor: Send + Sync {
   fn uuid(&self) -> Uuid;

   /// Writes the descriptor value. Fire-and-forget, like
   /// [`GattCharacteristic::set_notifying`].
   fn write(&self, value: &[u8]) -> Result<()>;
}
