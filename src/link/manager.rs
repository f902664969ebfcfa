//! Link manager for the FlexGlove peripheral.
//!
//! This module owns the connection lifecycle: scanning for the named glove,
//! establishing the GATT connection, driving service discovery, enabling
//! notifications, and relaying inbound frames. All session state lives on a
//! single actor task fed by a command channel, so every platform event and
//! caller request is serialized through one place.

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use smol_str::SmolStr;
use tokio::{
   select,
   sync::{mpsc, oneshot},
   time,
};
use uuid::Uuid;

use crate::{
   config::Config,
   error::{GloveError, Result},
   event::RxSink,
   link::{
      scanner::{self, DiscoveryScan},
      session::{LinkState, Session, SessionHandle},
   },
   protocol::{
      CLIENT_CHARACTERISTIC_CONFIG, ENABLE_NOTIFICATIONS, GLOVE_DATA_CHARACTERISTIC,
      GLOVE_SERVICE,
   },
   radio::{GattEvent, GattProfileRef, Packet, RadioStack, ScanEvent},
};

/// Channel buffer size
const CHANNEL_BUFFER_SIZE: usize = 256;

// === Commands ===

enum LinkCommand {
   // Caller requests
   Open {
      name: SmolStr,
      timeout_ms: u64,
      reply: oneshot::Sender<Result<SessionHandle>>,
   },
   Close {
      handle: SessionHandle,
      reply: oneshot::Sender<()>,
   },
   ForceCloseAll {
      reply: oneshot::Sender<()>,
   },
   IsOpen(oneshot::Sender<bool>),
   State(oneshot::Sender<LinkState>),
   Poll {
      handle: SessionHandle,
      reply: oneshot::Sender<Vec<u8>>,
   },
   SetRxListener(Option<RxSink>),
   ScanDevices {
      duration_ms: u64,
      reply: oneshot::Sender<Result<Vec<SmolStr>>>,
   },

   // Platform events, forwarded by per-attempt tasks. The attempt counter
   // identifies which open attempt an event belongs to; events from a
   // superseded attempt are discarded.
   Scan(u64, ScanEvent),
   ScanDeadline(u64),
   Gatt(u64, GattEvent),
   DiscoveryDone,
}

// === Public handle ===

/// Handle to the FlexGlove link manager.
///
/// This type is cheaply cloneable; all methods relay through the manager
/// actor's command channel.
#[derive(Clone)]
pub struct GloveLink {
   inbox: mpsc::Sender<LinkCommand>,
}

impl GloveLink {
   /// Spawns the manager actor over the given radio stack.
   pub fn new(stack: Arc<dyn RadioStack>, config: Config) -> Self {
      let (command_tx, command_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      tokio::spawn(LinkActor::new(stack, config, command_rx).run());
      Self { inbox: command_tx }
   }

   /// Scans for the named glove and connects. Resolves once the session is
   /// open or the attempt terminally fails; a `timeout_ms` of zero falls
   /// back to the configured default.
   pub async fn open(&self, name: &str, timeout_ms: u64) -> Result<SessionHandle> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(LinkCommand::Open {
            name: SmolStr::new(name),
            timeout_ms,
            reply: tx,
         })
         .await
         .map_err(|_| GloveError::ManagerShutdown)?;
      rx.await.map_err(|_| GloveError::ManagerShutdown)?
   }

   /// Closes the session. Idempotent; a stale handle still tears down the
   /// current session.
   pub async fn close(&self, handle: SessionHandle) {
      let (tx, rx) = oneshot::channel();
      if self
         .inbox
         .send(LinkCommand::Close { handle, reply: tx })
         .await
         .is_ok()
      {
         let _ = rx.await;
      }
   }

   /// Evicts and closes whatever session the manager currently holds, and
   /// aborts any in-flight discovery scan. For crash-recovery paths that no
   /// longer hold a handle.
   pub async fn force_close_all(&self) {
      let (tx, rx) = oneshot::channel();
      if self
         .inbox
         .send(LinkCommand::ForceCloseAll { reply: tx })
         .await
         .is_ok()
      {
         let _ = rx.await;
      }
   }

   pub async fn is_open(&self) -> bool {
      let (tx, rx) = oneshot::channel();
      if self.inbox.send(LinkCommand::IsOpen(tx)).await.is_err() {
         return false;
      }
      rx.await.unwrap_or(false)
   }

   pub async fn state(&self) -> LinkState {
      let (tx, rx) = oneshot::channel();
      if self.inbox.send(LinkCommand::State(tx)).await.is_err() {
         return LinkState::Closed;
      }
      rx.await.unwrap_or(LinkState::Closed)
   }

   /// Returns and clears the buffered frames as one contiguous byte vector,
   /// or empty if none are pending. Non-blocking; the timeout argument is
   /// accepted for interface compatibility and ignored.
   pub async fn poll(&self, handle: SessionHandle, _timeout_ms: u64) -> Vec<u8> {
      let (tx, rx) = oneshot::channel();
      if self
         .inbox
         .send(LinkCommand::Poll { handle, reply: tx })
         .await
         .is_err()
      {
         return Vec::new();
      }
      rx.await.unwrap_or_default()
   }

   /// Registers a push consumer. While a listener is registered, validated
   /// frames bypass the receive buffer.
   pub async fn set_rx_listener(&self, listener: RxSink) {
      let _ = self
         .inbox
         .send(LinkCommand::SetRxListener(Some(listener)))
         .await;
   }

   pub async fn clear_rx_listener(&self) {
      let _ = self.inbox.send(LinkCommand::SetRxListener(None)).await;
   }

   /// Runs an unfiltered discovery scan for `duration_ms` (zero falls back
   /// to the configured default) and returns the uniquely-named devices
   /// seen. Rejected with [`GloveError::ScanInProgress`] while another
   /// discovery scan is running.
   pub async fn scan_for_devices(&self, duration_ms: u64) -> Result<Vec<SmolStr>> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(LinkCommand::ScanDevices {
            duration_ms,
            reply: tx,
         })
         .await
         .map_err(|_| GloveError::ManagerShutdown)?;
      rx.await.map_err(|_| GloveError::ManagerShutdown)?
   }
}

// === Manager actor ===

struct LinkActor {
   stack: Arc<dyn RadioStack>,
   config: Config,
   command_rx: mpsc::Receiver<LinkCommand>,
   loopback_tx: mpsc::Sender<LinkCommand>,
   loopback_rx: mpsc::Receiver<LinkCommand>,

   // State
   session: Session,
   rx_listener: Option<RxSink>,
   /// Open-attempt generation. Bumped on every new attempt and every
   /// teardown; platform events carrying an older value are stale.
   attempt: u64,
   next_handle: SessionHandle,
   discovery: Option<DiscoveryScan>,
}

impl LinkActor {
   fn new(
      stack: Arc<dyn RadioStack>,
      config: Config,
      command_rx: mpsc::Receiver<LinkCommand>,
   ) -> Self {
      let (loopback_tx, loopback_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      Self {
         stack,
         config,
         command_rx,
         loopback_tx,
         loopback_rx,
         session: Session::new(),
         rx_listener: None,
         attempt: 0,
         next_handle: 1,
         discovery: None,
      }
   }

   async fn run(mut self) {
      info!("FlexGlove link manager starting up");

      loop {
         select! {
            cmd = self.command_rx.recv() => {
               let Some(cmd) = cmd else {
                  info!("FlexGlove link manager shutting down");
                  break;
               };
               self.handle_command(cmd);
            }
            Some(cmd) = self.loopback_rx.recv() => {
               self.handle_command(cmd);
            }
         }
      }

      self.cleanup();
   }

   fn cleanup(&mut self) {
      if let Some(discovery) = self.discovery.take() {
         discovery.abort();
      }
      self.session.close();
   }

   fn handle_command(&mut self, cmd: LinkCommand) {
      match cmd {
         LinkCommand::Open {
            name,
            timeout_ms,
            reply,
         } => {
            self.handle_open(name, timeout_ms, reply);
         },
         LinkCommand::Close { handle, reply } => {
            self.handle_close(handle);
            let _ = reply.send(());
         },
         LinkCommand::ForceCloseAll { reply } => {
            self.handle_force_close();
            let _ = reply.send(());
         },
         LinkCommand::IsOpen(reply) => {
            let _ = reply.send(self.session.is_open());
         },
         LinkCommand::State(reply) => {
            let _ = reply.send(self.session.state());
         },
         LinkCommand::Poll { handle, reply } => {
            if self.session.handle() != Some(handle) {
               debug!("Poll with stale handle {handle}");
            }
            let _ = reply.send(self.session.drain_rx());
         },
         LinkCommand::SetRxListener(listener) => {
            self.rx_listener = listener;
         },
         LinkCommand::ScanDevices { duration_ms, reply } => {
            self.handle_scan_devices(duration_ms, reply);
         },
         LinkCommand::Scan(attempt, event) => {
            self.handle_scan_event(attempt, event);
         },
         LinkCommand::ScanDeadline(attempt) => {
            self.handle_scan_deadline(attempt);
         },
         LinkCommand::Gatt(attempt, event) => {
            self.handle_gatt_event(attempt, event);
         },
         LinkCommand::DiscoveryDone => {
            self.discovery = None;
         },
      }
   }

   // === Open / connect ===

   fn handle_open(
      &mut self,
      name: SmolStr,
      timeout_ms: u64,
      reply: oneshot::Sender<Result<SessionHandle>>,
   ) {
      if !self.session.state().is_settled() {
         let _ = reply.send(Err(GloveError::SessionBusy));
         return;
      }
      if !self.stack.is_enabled() {
         let _ = reply.send(Err(GloveError::RadioUnavailable));
         return;
      }
      let Some(scanner) = self.stack.scanner() else {
         let _ = reply.send(Err(GloveError::ScannerUnavailable));
         return;
      };

      let timeout_ms = if timeout_ms == 0 {
         self.config.open_timeout_ms
      } else {
         timeout_ms
      };

      self.attempt += 1;
      let attempt = self.attempt;

      let (event_tx, event_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      if let Err(e) = scanner.start(Some(name.as_str()), event_tx) {
         let _ = reply.send(Err(e));
         return;
      }

      info!("Scanning for {name} (timeout {timeout_ms} ms)");
      self.spawn_scan_forwarder(attempt, event_rx);
      self.spawn_scan_deadline(attempt, Duration::from_millis(timeout_ms));
      self.session.begin(name, scanner, reply);
   }

   fn spawn_scan_forwarder(&self, attempt: u64, mut events: mpsc::Receiver<ScanEvent>) {
      let loopback = self.loopback_tx.clone();
      tokio::spawn(async move {
         while let Some(event) = events.recv().await {
            if loopback
               .send(LinkCommand::Scan(attempt, event))
               .await
               .is_err()
            {
               return;
            }
         }
      });
   }

   fn spawn_scan_deadline(&self, attempt: u64, timeout: Duration) {
      let loopback = self.loopback_tx.clone();
      tokio::spawn(async move {
         time::sleep(timeout).await;
         let _ = loopback.send(LinkCommand::ScanDeadline(attempt)).await;
      });
   }

   fn spawn_gatt_forwarder(&self, attempt: u64, mut events: mpsc::Receiver<GattEvent>) {
      let loopback = self.loopback_tx.clone();
      tokio::spawn(async move {
         while let Some(event) = events.recv().await {
            if loopback
               .send(LinkCommand::Gatt(attempt, event))
               .await
               .is_err()
            {
               return;
            }
         }
      });
   }

   fn handle_scan_event(&mut self, attempt: u64, event: ScanEvent) {
      if attempt != self.attempt {
         debug!("Ignoring scan event from superseded attempt {attempt}");
         return;
      }

      match event {
         ScanEvent::Advertisement { device } => {
            // Advertisements delivered after the first match (or after the
            // scan stopped) are ignored.
            if self.session.state() != LinkState::Scanning {
               return;
            }
            let name = device.name();
            if name.as_ref() != self.session.target() {
               debug!("Ignoring advertisement from {name:?}");
               return;
            }
            info!("Found device: {}", name.unwrap_or_default());

            self.session.found(device.clone());
            let (gatt_tx, gatt_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
            self.spawn_gatt_forwarder(attempt, gatt_rx);
            match device.connect(gatt_tx) {
               Ok(gatt) => self.session.attach_gatt(gatt),
               Err(e) => {
                  warn!("Connect request failed: {e}");
                  self.session.fail(GloveError::platform("connect", e));
               },
            }
         },
         ScanEvent::Failed(code) => {
            if self.session.state() == LinkState::Scanning {
               warn!("Scan failed: {code}");
               self.session.fail(GloveError::ScanFailed(code));
            }
         },
      }
   }

   fn handle_scan_deadline(&mut self, attempt: u64) {
      // The deadline races the advertisement; whichever fires second is a
      // no-op.
      if attempt == self.attempt && self.session.state() == LinkState::Scanning {
         info!(
            "Timed out scanning for {}",
            self.session.target().cloned().unwrap_or_default()
         );
         self.session.fail(GloveError::ScanTimedOut);
      }
   }

   // === GATT events ===

   fn handle_gatt_event(&mut self, attempt: u64, event: GattEvent) {
      if attempt != self.attempt {
         debug!("Ignoring GATT event from superseded attempt {attempt}");
         return;
      }

      match event {
         GattEvent::ConnectionChanged { connected: true } => {
            if self.session.state() != LinkState::Connecting {
               return;
            }
            self.session.begin_discovery();
            if let Some(gatt) = self.session.gatt() {
               if let Err(e) = gatt.discover_services() {
                  warn!("Service discovery request failed: {e}");
                  self.session.fail(GloveError::platform("discover", e));
               }
            }
         },
         GattEvent::ConnectionChanged { connected: false } => {
            if matches!(self.session.state(), LinkState::Idle | LinkState::Closed) {
               return;
            }
            info!("Link disconnected");
            self.session.disconnected();
            // Anything still in flight for this attempt is now void.
            self.attempt += 1;
         },
         GattEvent::ServicesDiscovered(profile) => {
            self.handle_discovery_complete(profile);
         },
         GattEvent::CharacteristicChanged { uuid, value } => {
            self.handle_notification(uuid, value);
         },
      }
   }

   fn handle_discovery_complete(&mut self, profile: GattProfileRef) {
      if self.session.state() != LinkState::ServiceDiscovery {
         debug!("Ignoring discovery result in state {:?}", self.session.state());
         return;
      }

      let Some(service) = profile.service(GLOVE_SERVICE) else {
         warn!("Service {GLOVE_SERVICE} not present on device");
         self.session.fail(GloveError::ServiceNotFound);
         return;
      };
      let Some(characteristic) = service.characteristic(GLOVE_DATA_CHARACTERISTIC) else {
         warn!("Characteristic {GLOVE_DATA_CHARACTERISTIC} not present in service");
         self.session.fail(GloveError::CharacteristicNotFound);
         return;
      };

      self.session.begin_notify_setup(characteristic.clone());

      // Notification setup is fire-and-forget: the session is declared open
      // without waiting for the descriptor write to be acknowledged.
      // Notifications the glove sends inside that window can be missed.
      if let Err(e) = characteristic.set_notifying(true) {
         warn!("Enabling notifications failed: {e}");
      }
      match characteristic.descriptor(CLIENT_CHARACTERISTIC_CONFIG) {
         Some(descriptor) => {
            if let Err(e) = descriptor.write(&ENABLE_NOTIFICATIONS) {
               warn!("CCCD write request failed: {e}");
            }
         },
         None => {
            warn!("{}", GloveError::DescriptorMissing);
         },
      }

      let handle = self.next_handle;
      self.next_handle += 1;
      info!("Session open (handle {handle})");
      self.session.opened(handle);
   }

   // === Notification relay ===

   fn handle_notification(&mut self, uuid: Uuid, value: Packet) {
      if !self.session.accepts_notifications() {
         debug!("Dropping notification outside active session");
         return;
      }
      if uuid != GLOVE_DATA_CHARACTERISTIC {
         debug!("Dropping notification from {uuid}, expected {GLOVE_DATA_CHARACTERISTIC}");
         return;
      }
      if value.is_empty() {
         debug!("Dropping empty notification");
         return;
      }

      debug!("← {} bytes: {}", value.len(), hex::encode(&value));
      if let Some(listener) = &self.rx_listener {
         listener.on_rx(&value);
      } else {
         self.session.push_rx(value);
      }
   }

   // === Teardown ===

   fn handle_close(&mut self, handle: SessionHandle) {
      if let Some(current) = self.session.handle() {
         if current != handle {
            debug!("Close with stale handle {handle} (current {current})");
         }
      }
      self.teardown();
   }

   fn handle_force_close(&mut self) {
      if let Some(discovery) = self.discovery.take() {
         discovery.abort();
      }
      self.teardown();
   }

   fn teardown(&mut self) {
      self.session.close();
      self.attempt += 1;
   }

   // === Discovery scan ===

   fn handle_scan_devices(
      &mut self,
      duration_ms: u64,
      reply: oneshot::Sender<Result<Vec<SmolStr>>>,
   ) {
      if self.discovery.is_some() {
         warn!("Discovery scan already in progress");
         let _ = reply.send(Err(GloveError::ScanInProgress));
         return;
      }
      if !self.stack.is_enabled() {
         let _ = reply.send(Err(GloveError::RadioUnavailable));
         return;
      }
      let Some(scanner) = self.stack.scanner() else {
         let _ = reply.send(Err(GloveError::ScannerUnavailable));
         return;
      };

      let duration_ms = if duration_ms == 0 {
         self.config.scan_duration_ms
      } else {
         duration_ms
      };

      let (event_tx, event_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      if let Err(e) = scanner.start(None, event_tx) {
         let _ = reply.send(Err(e));
         return;
      }

      info!("Starting discovery scan for {duration_ms} ms");
      let loopback = self.loopback_tx.clone();
      let scan_ref = scanner.clone();
      let task = tokio::spawn(async move {
         scanner::run_discovery(
            scan_ref,
            event_rx,
            Duration::from_millis(duration_ms),
            reply,
         )
         .await;
         let _ = loopback.send(LinkCommand::DiscoveryDone).await;
      });
      self.discovery = Some(DiscoveryScan::new(task, scanner));
   }
}
