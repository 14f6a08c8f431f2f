//! # Transport Acquisition
//!
//! TCP and TLS listeners and dialers. These produce the reliable byte
//! streams the session driver consumes; the framing core is transport-
//! agnostic beyond that interface.

pub mod tcp;
pub mod tls;

pub use tcp::Incoming;
