//! # Core Protocol Components
//!
//! The packet protocol engine: model, wire format, stream decoding, and the
//! content transformation pipeline.
//!
//! ## Components
//! - **Packet**: typed message record with kinds, flags, and headers
//! - **Frame**: delimiter-terminated wire serialisation
//! - **Receiver**: chunk-tolerant state-machine decoder with resync
//! - **Codec**: tokio codec adapter for framing over byte streams
//! - **Pipeline**: compress/encrypt transforms between packet and frame
//!
//! ## Wire Format
//! ```text
//! [Kind(1)] [HeaderLen(2)] [Headers(N)] [Flags(1)] [PayloadLen(4)] [Payload(N)] [Delimiter(4)]
//! ```
//!
//! ## Security
//! - Length caps validated before allocation
//! - Decompression output bounded by the payload cap
//! - AEAD integrity on encrypted payloads

pub mod codec;
pub mod frame;
pub mod packet;
pub mod pipeline;
pub mod receiver;
