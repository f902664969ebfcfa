//! In-memory radio stack used by the test suite.
//!
//! Tests drive the link manager by pushing [`ScanEvent`]s and [`GattEvent`]s
//! into the sinks the manager registered, exactly as a real platform stack
//! would deliver them.

use std::sync::{
   Arc,
   atomic::{AtomicBool, AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::{sync::mpsc, time};
use uuid::Uuid;

use crate::{
   error::Result,
   protocol::{CLIENT_CHARACTERISTIC_CONFIG, GLOVE_DATA_CHARACTERISTIC, GLOVE_SERVICE},
   radio::{
      CharacteristicRef, DescriptorRef, GattCharacteristic, GattDescriptor, GattEvent, GattLink,
      GattLinkRef, GattProfile, GattProfileRef, GattService, GattServiceRef, LeScanner, Packet,
      Peripheral, PeripheralRef, RadioStack, ScanEvent, ScannerRef,
   },
};

pub(crate) struct FakeRadio {
   enabled: AtomicBool,
   scanner: Mutex<Option<Arc<FakeScanner>>>,
}

impl FakeRadio {
   pub fn new(scanner: Arc<FakeScanner>) -> Arc<Self> {
      Arc::new(Self {
         enabled: AtomicBool::new(true),
         scanner: Mutex::new(Some(scanner)),
      })
   }

   pub fn disabled() -> Arc<Self> {
      Arc::new(Self {
         enabled: AtomicBool::new(false),
         scanner: Mutex::new(None),
      })
   }

   pub fn without_scanner() -> Arc<Self> {
      Arc::new(Self {
         enabled: AtomicBool::new(true),
         scanner: Mutex::new(None),
      })
   }
}

impl RadioStack for FakeRadio {
   fn is_enabled(&self) -> bool {
      self.enabled.load(Ordering::Relaxed)
   }

   fn scanner(&self) -> Option<ScannerRef> {
      self
         .scanner
         .lock()
         .clone()
         .map(|scanner| scanner as ScannerRef)
   }
}

#[derive(Default)]
pub(crate) struct FakeScanner {
   sink: Mutex<Option<mpsc::Sender<ScanEvent>>>,
   pub last_filter: Mutex<Option<String>>,
   pub starts: AtomicUsize,
   pub stops: AtomicUsize,
}

impl FakeScanner {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   /// Waits until the manager has started the scan and returns the event
   /// sink it registered.
   pub async fn sink(&self) -> mpsc::Sender<ScanEvent> {
      loop {
         if let Some(sink) = self.sink.lock().clone() {
            return sink;
         }
         time::sleep(time::Duration::from_millis(1)).await;
      }
   }

   pub async fn advertise(&self, device: PeripheralRef) {
      let _ = self.sink().await.send(ScanEvent::Advertisement { device }).await;
   }

   pub async fn fail(&self, code: i32) {
      let _ = self.sink().await.send(ScanEvent::Failed(code)).await;
   }
}

impl LeScanner for FakeScanner {
   fn start(&self, filter: Option<&str>, sink: mpsc::Sender<ScanEvent>) -> Result<()> {
      self.starts.fetch_add(1, Ordering::Relaxed);
      *self.last_filter.lock() = filter.map(str::to_string);
      *self.sink.lock() = Some(sink);
      Ok(())
   }

   fn stop(&self) {
      self.stops.fetch_add(1, Ordering::Relaxed);
   }
}

pub(crate) struct FakePeripheral {
   name: Option<SmolStr>,
   pub link: Arc<FakeGattLink>,
}

impl FakePeripheral {
   pub fn new(name: &str) -> Arc<Self> {
      Arc::new(Self {
         name: Some(SmolStr::new(name)),
         link: Arc::new(FakeGattLink::default()),
      })
   }

   pub fn unnamed() -> Arc<Self> {
      Arc::new(Self {
         name: None,
         link: Arc::new(FakeGattLink::default()),
      })
   }
}

impl Peripheral for FakePeripheral {
   fn name(&self) -> Option<SmolStr> {
      self.name.clone()
   }

   fn connect(&self, sink: mpsc::Sender<GattEvent>) -> Result<GattLinkRef> {
      self.link.connects.fetch_add(1, Ordering::Relaxed);
      *self.link.sink.lock() = Some(sink);
      Ok(self.link.clone())
   }
}

#[derive(Default)]
pub(crate) struct FakeGattLink {
   sink: Mutex<Option<mpsc::Sender<GattEvent>>>,
   pub connects: AtomicUsize,
   pub discover_requests: AtomicUsize,
   pub disconnects: AtomicUsize,
}

impl FakeGattLink {
   pub async fn sink(&self) -> mpsc::Sender<GattEvent> {
      loop {
         if let Some(sink) = self.sink.lock().clone() {
            return sink;
         }
         time::sleep(time::Duration::from_millis(1)).await;
      }
   }

   pub async fn set_connected(&self, connected: bool) {
      let _ = self
         .sink()
         .await
         .send(GattEvent::ConnectionChanged { connected })
         .await;
   }

   pub async fn deliver_profile(&self, profile: GattProfileRef) {
      let _ = self
         .sink()
         .await
         .send(GattEvent::ServicesDiscovered(profile))
         .await;
   }

   pub async fn notify(&self, uuid: Uuid, value: &[u8]) {
      let _ = self
         .sink()
         .await
         .send(GattEvent::CharacteristicChanged {
            uuid,
            value: Packet::from_slice(value),
         })
         .await;
   }
}

impl GattLink for FakeGattLink {
   fn discover_services(&self) -> Result<()> {
      self.discover_requests.fetch_add(1, Ordering::Relaxed);
      Ok(())
   }

   fn disconnect(&self) {
      self.disconnects.fetch_add(1, Ordering::Relaxed);
   }
}

pub(crate) struct FakeProfile {
   services: Vec<GattServiceRef>,
}

impl FakeProfile {
   /// Profile matching the glove firmware layout. Returns the profile and
   /// the data characteristic so tests can inspect notify/descriptor state.
   pub fn glove() -> (Arc<Self>, Arc<FakeCharacteristic>) {
      let descriptor = Arc::new(FakeDescriptor {
         uuid: CLIENT_CHARACTERISTIC_CONFIG,
         writes: Mutex::new(Vec::new()),
      });
      let characteristic = Arc::new(FakeCharacteristic {
         uuid: GLOVE_DATA_CHARACTERISTIC,
         descriptors: vec![descriptor],
         notifying: AtomicBool::new(false),
      });
      let service = Arc::new(FakeService {
         uuid: GLOVE_SERVICE,
         characteristics: vec![characteristic.clone() as CharacteristicRef],
      });
      (
         Arc::new(Self {
            services: vec![service],
         }),
         characteristic,
      )
   }

   /// Glove layout minus the client-characteristic-config descriptor, as
   /// seen on stacks that manage the subscription themselves.
   pub fn glove_without_descriptor() -> (Arc<Self>, Arc<FakeCharacteristic>) {
      let characteristic = Arc::new(FakeCharacteristic {
         uuid: GLOVE_DATA_CHARACTERISTIC,
         descriptors: Vec::new(),
         notifying: AtomicBool::new(false),
      });
      let service = Arc::new(FakeService {
         uuid: GLOVE_SERVICE,
         characteristics: vec![characteristic.clone() as CharacteristicRef],
      });
      (
         Arc::new(Self {
            services: vec![service],
         }),
         characteristic,
      )
   }

   /// Profile whose services do not include the glove service.
   pub fn missing_service() -> Arc<Self> {
      let service = Arc::new(FakeService {
         uuid: Uuid::from_u128(0xdead_beef),
         characteristics: Vec::new(),
      });
      Arc::new(Self {
         services: vec![service],
      })
   }

   /// Glove service present but without the data characteristic.
   pub fn missing_characteristic() -> Arc<Self> {
      let service = Arc::new(FakeService {
         uuid: GLOVE_SERVICE,
         characteristics: Vec::new(),
      });
      Arc::new(Self {
         services: vec![service],
      })
   }
}

impl GattProfile for FakeProfile {
   fn service(&self, uuid: Uuid) -> Option<GattServiceRef> {
      self.services.iter().find(|s| s.uuid() == uuid).cloned()
   }
}

struct FakeService {
   uuid: Uuid,
   characteristics: Vec<CharacteristicRef>,
}

impl GattService for FakeService {
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

pub(crate) struct FakeCharacteristic {
   uuid: Uuid,
   descriptors: Vec<Arc<FakeDescriptor>>,
   pub notifying: AtomicBool,
}

impl GattCharacteristic for FakeCharacteristic {
   fn uuid(&self) -> Uuid {
      self.uuid
   }

   fn descriptor(&self, uuid: Uuid) -> Option<DescriptorRef> {
      self
         .descriptors
         .iter()
         .find(|d| d.uuid == uuid)
         .cloned()
         .map(|d| d as DescriptorRef)
   }

   fn set_notifying(&self, enabled: bool) -> Result<()> {
      self.notifying.store(enabled, Ordering::Relaxed);
      Ok(())
   }
}

impl FakeCharacteristic {
   pub fn descriptor_writes(&self) -> Vec<Vec<u8>> {
      self
         .descriptors
         .first()
         .map(|d| d.writes.lock().clone())
         .unwrap_or_default()
   }
}

pub(crate) struct FakeDescriptor {
   uuid: Uuid,
   writes: Mutex<Vec<Vec<u8>>>,
}

impl GattDescriptor for FakeDescriptor {
   fn uuid(&self) -> Uuid {
      self.uuid
   }

   fn write(&self, value: &[u8]) -> Result<()> {
      self.writes.lock().push(value.to_vec());
      Ok(())
   }
}
