//! Discovery scanning.
//!
//! A discovery scan runs unfiltered for a fixed duration, aggregating the
//! uniquely-named advertisements seen. Unnamed advertisements are dropped
//! and duplicate names collapse to one entry, preserving first-sight order.
//! Only one discovery scan may be in flight; the manager enforces that.

use std::time::Duration;

use log::debug;
use smol_str::SmolStr;
use tokio::{
   select,
   sync::{mpsc, oneshot},
   task::JoinHandle,
   time,
};

use crate::{
   error::{GloveError, Result},
   radio::{ScanEvent, ScannerRef},
};

/// Handle to an in-flight discovery scan, held by the manager so that a
/// forced teardown can reclaim the radio.
pub(crate) struct DiscoveryScan {
   task: JoinHandle<()>,
   scanner: ScannerRef,
}

impl DiscoveryScan {
   pub fn new(task: JoinHandle<()>, scanner: ScannerRef) -> Self {
      Self { task, scanner }
   }

   pub fn abort(self) {
      self.task.abort();
      self.scanner.stop();
   }
}

/// Collects uniquely-named advertisements until `duration` elapses, then
/// stops the scan and resolves `reply`. A platform scan failure resolves the
/// reply early; either way exactly one terminal result is emitted.
pub(crate) async fn run_discovery(
   scanner: ScannerRef,
   mut events: mpsc::Receiver<ScanEvent>,
   duration: Duration,
   reply: oneshot::Sender<Result<Vec<SmolStr>>>,
) {
   let deadline = time::Instant::now() + duration;
   let mut names: Vec<SmolStr> = Vec::new();

   let result = loop {
      select! {
         event = events.recv() => match event {
            Some(ScanEvent::Advertisement { device }) => {
               let Some(name) = device.name() else {
                  continue;
               };
               if name.is_empty() {
                  continue;
               }
               if !names.contains(&name) {
                  debug!("Discovered device: {name}");
                  names.push(name);
               }
            },
            Some(ScanEvent::Failed(code)) => {
               break Err(GloveError::ScanFailed(code));
            },
            None => {
               break Err(GloveError::platform("scan", "event stream closed"));
            },
         },
         _ = time::sleep_until(deadline) => {
            debug!("Discovery scan complete: {} device(s)", names.len());
            break Ok(names);
         },
      }
   };

   scanner.stop();
   let _ = reply.send(result);
}
