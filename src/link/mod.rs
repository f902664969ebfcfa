//! Connection management for the FlexGlove link.
//!
//! This module owns the session lifecycle from scan to teardown: the manager
//! actor serializing every transition, the session state it mutates, and the
//! standalone discovery scan.

pub mod manager;
pub(crate) mod scanner;
pub mod session;
