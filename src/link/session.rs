//! Connection session state.
//!
//! A [`Session`] is the single logical connection the manager owns at any
//! time: its lifecycle state, the platform capability handles acquired so
//! far, the caller's pending open reply, and the receive buffer for
//! pull-style consumers. All mutation happens on the manager actor, which
//! serializes every transition.

use std::collections::VecDeque;

use log::debug;
use smol_str::SmolStr;
use tokio::sync::oneshot;

use crate::{
   error::{GloveError, Result},
   radio::{CharacteristicRef, GattLinkRef, Packet, PeripheralRef, ScannerRef},
};

/// Opaque handle identifying a successfully opened session.
pub type SessionHandle = u64;

/// Lifecycle state of the connection session.
///
/// Transitions run strictly forward through `Scanning` → `Connecting` →
/// `ServiceDiscovery` → `NotifyEnabling` → `Open` on success; any state may
/// move to `Failed` on error or `Closed` on teardown. Undefined
/// (state, event) pairs are no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
   Idle,
   Scanning,
   Connecting,
   ServiceDiscovery,
   NotifyEnabling,
   Open,
   Closed,
   Failed,
}

impl LinkState {
   /// True for states in which no connection attempt is in progress and a
   /// new `open` may begin.
   pub const fn is_settled(self) -> bool {
      matches!(self, Self::Idle | Self::Closed | Self::Failed)
   }
}

/// The single active connection session.
pub struct Session {
   state: LinkState,
   target: Option<SmolStr>,
   scanner: Option<ScannerRef>,
   device: Option<PeripheralRef>,
   gatt: Option<GattLinkRef>,
   characteristic: Option<CharacteristicRef>,
   handle: Option<SessionHandle>,
   pending_open: Option<oneshot::Sender<Result<SessionHandle>>>,
   rx_buffer: VecDeque<Packet>,
}

impl Session {
   pub fn new() -> Self {
      Self {
         state: LinkState::Idle,
         target: None,
         scanner: None,
         device: None,
         gatt: None,
         characteristic: None,
         handle: None,
         pending_open: None,
         rx_buffer: VecDeque::new(),
      }
   }

   pub fn state(&self) -> LinkState {
      self.state
   }

   pub fn target(&self) -> Option<&SmolStr> {
      self.target.as_ref()
   }

   pub fn handle(&self) -> Option<SessionHandle> {
      self.handle
   }

   pub fn gatt(&self) -> Option<&GattLinkRef> {
      self.gatt.as_ref()
   }

   /// Both the state and the connection capability must agree.
   pub fn is_open(&self) -> bool {
      self.state == LinkState::Open && self.gatt.is_some()
   }

   /// True while the relay should accept characteristic-change events.
   pub fn accepts_notifications(&self) -> bool {
      self.characteristic.is_some()
         && matches!(self.state, LinkState::NotifyEnabling | LinkState::Open)
   }

   fn set_state(&mut self, next: LinkState) {
      if self.state != next {
         debug!("Session state {:?} → {next:?}", self.state);
         self.state = next;
      }
   }

   /// Begins a new open attempt: target found yet to be scanned for. Any
   /// capability retained from a failed attempt is released first.
   pub fn begin(
      &mut self,
      target: SmolStr,
      scanner: ScannerRef,
      reply: oneshot::Sender<Result<SessionHandle>>,
   ) {
      debug_assert!(self.state.is_settled());
      self.close();
      self.target = Some(target);
      self.scanner = Some(scanner);
      self.pending_open = Some(reply);
      self.set_state(LinkState::Scanning);
   }

   /// Target advertisement consumed; the scan is stopped and the connect
   /// request is in flight.
   pub fn found(&mut self, device: PeripheralRef) {
      self.stop_scan();
      self.device = Some(device);
      self.set_state(LinkState::Connecting);
   }

   pub fn attach_gatt(&mut self, gatt: GattLinkRef) {
      self.gatt = Some(gatt);
   }

   pub fn begin_discovery(&mut self) {
      self.set_state(LinkState::ServiceDiscovery);
   }

   pub fn begin_notify_setup(&mut self, characteristic: CharacteristicRef) {
      self.characteristic = Some(characteristic);
      self.set_state(LinkState::NotifyEnabling);
   }

   /// Declares the session open and resolves the caller's pending reply.
   pub fn opened(&mut self, handle: SessionHandle) {
      self.handle = Some(handle);
      self.set_state(LinkState::Open);
      self.resolve_open(Ok(handle));
   }

   /// Stops an in-flight scan, if any. Idempotent.
   pub fn stop_scan(&mut self) {
      if let Some(scanner) = self.scanner.take() {
         scanner.stop();
      }
   }

   /// Resolves the pending open reply, if one is still waiting. Later calls
   /// are no-ops, so each open attempt emits exactly one terminal result.
   pub fn resolve_open(&mut self, result: Result<SessionHandle>) {
      if let Some(reply) = self.pending_open.take() {
         let _ = reply.send(result);
      }
   }

   /// Terminal failure of the current attempt. The connection capability is
   /// kept until the caller closes; retry policy belongs to the caller.
   pub fn fail(&mut self, err: GloveError) {
      self.stop_scan();
      self.resolve_open(Err(err));
      self.set_state(LinkState::Failed);
   }

   /// Unsolicited link loss. Terminal for the session, never auto-retried.
   pub fn disconnected(&mut self) {
      self.stop_scan();
      self.resolve_open(Err(GloveError::platform("link", "connection lost")));
      self.gatt = None;
      self.characteristic = None;
      self.handle = None;
      self.rx_buffer.clear();
      self.set_state(LinkState::Closed);
   }

   /// Explicit teardown. Idempotent and callable from any state; platform
   /// disconnect failures are logged by the backend, never raised.
   pub fn close(&mut self) {
      self.stop_scan();
      if let Some(characteristic) = self.characteristic.take() {
         if let Err(e) = characteristic.set_notifying(false) {
            debug!("Disabling notifications during close failed: {e}");
         }
      }
      if let Some(gatt) = self.gatt.take() {
         gatt.disconnect();
      }
      self.device = None;
      self.handle = None;
      self.resolve_open(Err(GloveError::SessionClosed));
      self.rx_buffer.clear();
      self.set_state(LinkState::Closed);
   }

   /// Appends a validated payload for pull-style consumption.
   pub fn push_rx(&mut self, payload: Packet) {
      self.rx_buffer.push_back(payload);
   }

   /// Drains the receive buffer, FIFO, into one contiguous byte vector.
   pub fn drain_rx(&mut self) -> Vec<u8> {
      let mut out = Vec::new();
      for packet in self.rx_buffer.drain(..) {
         out.extend_from_slice(&packet);
      }
      out
   }
}
