//! Push-delivery listener for inbound glove frames.
//!
//! The notification relay forwards every validated payload to the registered
//! listener; when none is registered the payload lands in the session's
//! receive buffer for pull-style consumption instead.

use std::sync::Arc;

/// Trait for implementing push-style frame consumption.
pub trait RxListener: Send + Sync {
   /// Called with the raw payload of each validated notification.
   fn on_rx(&self, data: &[u8]);
}

impl<F> RxListener for F
where
   F: Fn(&[u8]) + Send + Sync,
{
   fn on_rx(&self, data: &[u8]) {
      self(data);
   }
}

/// Type alias for a thread-safe, shareable listener.
pub type RxSink = Arc<dyn RxListener>;
