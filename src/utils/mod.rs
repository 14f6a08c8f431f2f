//! # Utility Modules
//!
//! Supporting utilities for cryptography, compression, archives, logging,
//! timing, and metrics.
//!
//! ## Components
//! - **Crypto**: AES-256-GCM encryption with PBKDF2 key stretching
//! - **Compression**: LZ4 and Zstd with size limits and thresholds
//! - **Archive**: gzip-tar directory packing with traversal guards
//! - **Logging**: Structured logging configuration
//! - **Timeout**: Async timeout wrappers
//! - **Metrics**: Thread-safe observability counters
//!
//! ## Security
//! - Cryptographically secure RNG for nonces
//! - Decompression bomb protection aligned with the payload cap
//! - Key material zeroed after cipher construction (zeroize crate)

pub mod archive;
pub mod compression;
pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::Metrics;
