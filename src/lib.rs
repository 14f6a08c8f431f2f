//! # framelink
//!
//! Framed, length-delimited socket messaging over TCP and TLS.
//!
//! The library exchanges typed [`Packet`]s (text, opaque bytes, named
//! objects, files, and directory archives) between a server and many
//! clients, with optional per-message compression and AES-256-GCM
//! encryption keyed from a passphrase.
//!
//! ## Wire Format
//! ```text
//! [Kind(1)] [HeaderLen(2)] [Headers(N)] [Flags(1)] [PayloadLen(4)] [Payload(N)] [Delimiter(4)]
//! ```
//! Multi-byte integers are big-endian. The trailing delimiter is redundant
//! with the declared lengths and exists only so a desynchronised decoder
//! can recover at the next frame boundary.
//!
//! ## Layers
//! - [`core`]: packet model, wire encoding, streaming decoder, transform
//!   pipeline
//! - [`session`]: per-connection driver: receive task, serialised sends,
//!   authentication, lifecycle
//! - [`transport`]: TCP/TLS listeners and dialers
//! - [`utils`]: compression, crypto, archives, metrics, logging
//!
//! ## Example
//! ```no_run
//! use framelink::config::LinkConfig;
//! use framelink::core::packet::Packet;
//! use framelink::transport::tcp;
//! use framelink::utils::Metrics;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> framelink::error::Result<()> {
//!     let config = LinkConfig::default_with_overrides(|c| {
//!         c.client.address = "127.0.0.1:9000".into();
//!     });
//!     let (session, mut events) = tcp::connect(&config, Arc::new(Metrics::new())).await?;
//!     session.send(Packet::text("hello")).await?;
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod session;
pub mod transport;
pub mod utils;

pub use crate::config::LinkConfig;
pub use crate::core::codec::FrameCodec;
pub use crate::core::frame::Frame;
pub use crate::core::packet::{Headers, Packet, PacketFlags, PacketKind};
pub use crate::core::pipeline::TransformContext;
pub use crate::core::receiver::{FrameDecoder, ReceiveEvent};
pub use crate::error::{Result, WireError};
pub use crate::session::{CloseReason, Session, SessionEvent, SessionRole, SessionState};
