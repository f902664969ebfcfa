//! BlueZ-backed implementation of the radio capability contract.
//!
//! This module maps the [`crate::radio`] traits onto `bluer`: adapter power
//! tracking, the device-discovery stream for scanning, and the remote GATT
//! API for connect, discovery, and notifications. Service and characteristic
//! UUIDs are resolved eagerly during discovery so that the lookup capability
//! handed to the state machine is synchronous.

use std::sync::{
   Arc,
   atomic::{AtomicBool, Ordering},
};

use bluer::{
   Adapter, AdapterEvent, AdapterProperty, Device, DeviceEvent, DeviceProperty, Session,
   gatt::remote,
};
use futures::StreamExt;
use log::{debug, warn};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
   error::Result,
   radio::{
      CharacteristicRef, DescriptorRef, GattCharacteristic, GattDescriptor, GattEvent, GattLink,
      GattLinkRef, GattProfile, GattService, GattServiceRef, LeScanner, Packet, Peripheral,
      RadioStack, ScanEvent, ScannerRef,
   },
};

/// Scan failure code reported when the discovery stream cannot be opened.
/// BlueZ reports errors as messages rather than numeric codes; the message is
/// logged at the failure site.
const SCAN_ERR_START_FAILED: i32 = -1;

/// BlueZ radio stack.
pub struct BluezRadio {
   adapter: Adapter,
   powered: Arc<AtomicBool>,
   _session: Session,
}

impl BluezRadio {
   /// Opens a session against the default adapter and starts tracking its
   /// powered state.
   pub async fn new() -> Result<Self> {
      let session = Session::new().await?;
      let adapter = session.default_adapter().await?;

      if !adapter.is_powered().await.unwrap_or(false) {
         if let Err(e) = adapter.set_powered(true).await {
            warn!("Failed to power on adapter {}: {e}", adapter.name());
         }
      }

      let powered = Arc::new(AtomicBool::new(adapter.is_powered().await.unwrap_or(false)));
      Self::spawn_power_monitor(adapter.clone(), powered.clone());

      Ok(Self {
         adapter,
         powered,
         _session: session,
      })
   }

   fn spawn_power_monitor(adapter: Adapter, powered: Arc<AtomicBool>) {
      tokio::spawn(async move {
         let Ok(mut events) = adapter.events().await else {
            warn!("Failed to subscribe to adapter events");
            return;
         };
         while let Some(event) = events.next().await {
            if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(on)) = event {
               debug!("Adapter powered: {on}");
               powered.store(on, Ordering::Relaxed);
            }
         }
      });
   }
}

impl RadioStack for BluezRadio {
   fn is_enabled(&self) -> bool {
      self.powered.load(Ordering::Relaxed)
   }

   fn scanner(&self) -> Option<ScannerRef> {
      Some(Arc::new(BluezScanner {
         adapter: self.adapter.clone(),
         task: Mutex::new(None),
      }))
   }
}

/// Single-use scanner over the BlueZ discovery stream.
struct BluezScanner {
   adapter: Adapter,
   task: Mutex<Option<JoinHandle<()>>>,
}

impl LeScanner for BluezScanner {
   fn start(&self, filter: Option<&str>, sink: mpsc::Sender<ScanEvent>) -> Result<()> {
      let adapter = self.adapter.clone();
      let filter: Option<SmolStr> = filter.map(SmolStr::new);
      let handle = tokio::spawn(scan_task(adapter, filter, sink));

      // A restarted scanner replaces its previous discovery stream.
      if let Some(previous) = self.task.lock().replace(handle) {
         previous.abort();
      }
      Ok(())
   }

   fn stop(&self) {
      if let Some(task) = self.task.lock().take() {
         // Aborting drops the discovery stream, which ends the BlueZ scan.
         task.abort();
      }
   }
}

async fn scan_task(adapter: Adapter, filter: Option<SmolStr>, sink: mpsc::Sender<ScanEvent>) {
   let mut events = match adapter.discover_devices().await {
      Ok(events) => events,
      Err(e) => {
         warn!("Failed to start discovery: {e}");
         let _ = sink.send(ScanEvent::Failed(SCAN_ERR_START_FAILED)).await;
         return;
      },
   };

   while let Some(event) = events.next().await {
      let AdapterEvent::DeviceAdded(addr) = event else {
         continue;
      };
      let Ok(device) = adapter.device(addr) else {
         continue;
      };
      let name = device.name().await.ok().flatten().map(SmolStr::from);

      // Name filtering happens client-side; BlueZ discovery filters cannot
      // express an exact-name match.
      if let Some(wanted) = &filter {
         if name.as_deref() != Some(wanted.as_str()) {
            continue;
         }
      }

      debug!("Advertisement from {addr} ({name:?})");
      let peripheral = Arc::new(BluezPeripheral { device, name });
      if sink
         .send(ScanEvent::Advertisement { device: peripheral })
         .await
         .is_err()
      {
         return;
      }
   }
}

/// Capability handle for a discovered device.
struct BluezPeripheral {
   device: Device,
   name: Option<SmolStr>,
}

impl Peripheral for BluezPeripheral {
   fn name(&self) -> Option<SmolStr> {
      self.name.clone()
   }

   fn connect(&self, sink: mpsc::Sender<GattEvent>) -> Result<GattLinkRef> {
      let device = self.device.clone();
      let events = sink.clone();

      tokio::spawn(async move {
         let addr = device.address();
         match device.connect().await {
            Ok(()) => {
               debug!("Connected to {addr}");
               if events
                  .send(GattEvent::ConnectionChanged { connected: true })
                  .await
                  .is_err()
               {
                  return;
               }
            },
            Err(e) => {
               warn!("Connect to {addr} failed: {e}");
               let _ = events
                  .send(GattEvent::ConnectionChanged { connected: false })
                  .await;
               return;
            },
         }

         // Watch for an unsolicited link drop.
         let Ok(mut device_events) = device.events().await else {
            return;
         };
         while let Some(DeviceEvent::PropertyChanged(prop)) = device_events.next().await {
            if let DeviceProperty::Connected(false) = prop {
               debug!("Link to {addr} dropped");
               let _ = events
                  .send(GattEvent::ConnectionChanged { connected: false })
                  .await;
               return;
            }
         }
      });

      Ok(Arc::new(BluezGattLink {
         device: self.device.clone(),
         sink,
      }))
   }
}

struct BluezGattLink {
   device: Device,
   sink: mpsc::Sender<GattEvent>,
}

impl GattLink for BluezGattLink {
   fn discover_services(&self) -> Result<()> {
      let device = self.device.clone();
      let sink = self.sink.clone();
      tokio::spawn(async move {
         match resolve_profile(&device, &sink).await {
            Ok(profile) => {
               let _ = sink
                  .send(GattEvent::ServicesDiscovered(Arc::new(profile)))
                  .await;
            },
            Err(e) => {
               warn!("Service discovery on {} failed: {e}", device.address());
            },
         }
      });
      Ok(())
   }

   fn disconnect(&self) {
      let device = self.device.clone();
      tokio::spawn(async move {
         if let Err(e) = device.disconnect().await {
            warn!("Disconnect from {} failed: {e}", device.address());
         }
      });
   }
}

/// Resolves the remote GATT tree into a synchronous lookup structure.
async fn resolve_profile(
   device: &Device,
   sink: &mpsc::Sender<GattEvent>,
) -> bluer::Result<BluezProfile> {
   let mut services = Vec::new();
   for service in device.services().await? {
      let service_uuid = service.uuid().await?;
      let mut characteristics: Vec<CharacteristicRef> = Vec::new();

      for characteristic in service.characteristics().await? {
         let char_uuid = characteristic.uuid().await?;
         let mut descriptors: Vec<DescriptorRef> = Vec::new();

         for descriptor in characteristic.descriptors().await? {
            descriptors.push(Arc::new(BluezDescriptor {
               uuid: descriptor.uuid().await?,
               descriptor,
            }));
         }

         characteristics.push(Arc::new(BluezCharacteristic {
            uuid: char_uuid,
            characteristic,
            descriptors,
            sink: sink.clone(),
            notify_task: Mutex::new(None),
         }));
      }

      services.push(Arc::new(BluezService {
         uuid: service_uuid,
         characteristics,
      }) as GattServiceRef);
   }
   Ok(BluezProfile { services })
}

struct BluezProfile {
   services: Vec<GattServiceRef>,
}

impl GattProfile for BluezProfile {
   fn service(&self, uuid: Uuid) -> Option<GattServiceRef> {
      self.services.iter().find(|s| s.uuid() == uuid).cloned()
   }
}

struct BluezService {
   uuid: Uuid,
   characteristics: Vec<CharacteristicRef>,
}

impl GattService for BluezService {
   fn uuid(&self) -> Uuid {
      self.uuid
   }

   fn characteristic(&self, uuid: Uuid) -> Option<CharacteristicRef> {
      self
         .characteristics
         .iter()
         .find(|c| c.uuid() == uuid)
         .cloned()
   }
}

struct BluezCharacteristic {
   uuid: Uuid,
   characteristic: remote::Characteristic,
   descriptors: Vec<DescriptorRef>,
   sink: mpsc::Sender<GattEvent>,
   notify_task: Mutex<Option<JoinHandle<()>>>,
}

impl GattCharacteristic for BluezCharacteristic {
   fn uuid(&self) -> Uuid {
      self.uuid
   }

   fn descriptor(&self, uuid: Uuid) -> Option<DescriptorRef> {
      self.descriptors.iter().find(|d| d.uuid() == uuid).cloned()
   }

   fn set_notifying(&self, enabled: bool) -> Result<()> {
      if !enabled {
         if let Some(task) = self.notify_task.lock().take() {
            task.abort();
         }
         return Ok(());
      }

      let characteristic = self.characteristic.clone();
      let sink = self.sink.clone();
      let uuid = self.uuid;
      let task = tokio::spawn(async move {
         let stream = match characteristic.notify().await {
            Ok(stream) => stream,
            Err(e) => {
               warn!("Failed to subscribe to {uuid}: {e}");
               return;
            },
         };
         let mut stream = std::pin::pin!(stream);
         while let Some(value) = stream.next().await {
            debug!("← {uuid}: {}", hex::encode(&value));
            let packet = Packet::from_slice(&value);
            if sink
               .send(GattEvent::CharacteristicChanged {
                  uuid,
                  value: packet,
               })
               .await
               .is_err()
            {
               return;
            }
         }
      });

      if let Some(previous) = self.notify_task.lock().replace(task) {
         previous.abort();
      }
      Ok(())
   }
}

struct BluezDescriptor {
   uuid: Uuid,
   descriptor: remote::Descriptor,
}

impl GattDescriptor for BluezDescriptor {
   fn uuid(&self) -> Uuid {
      self.uuid
   }

   fn write(&self, value: &[u8]) -> Result<()> {
      let descriptor = self.descriptor.clone();
      let uuid = self.uuid;
      let value = value.to_vec();
      tokio::spawn(async move {
         if let Err(e) = descriptor.write(&value).await {
            warn!("Descriptor write to {uuid} failed: {e}");
         }
      });
      Ok(())
   }
}
