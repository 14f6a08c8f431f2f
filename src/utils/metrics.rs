//! Observability counters.
//!
//! Thread-safe atomic counters for session and pipeline events. The session
//! driver touches each counter at most once per packet; sharing is by
//! `Arc<Metrics>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for protocol operations.
#[derive(Debug)]
pub struct Metrics {
    /// Sessions opened over the lifetime of this instance
    pub sessions_opened: AtomicU64,
    /// Sessions that have reached Closed
    pub sessions_closed: AtomicU64,
    /// Packets written to transports
    pub packets_sent: AtomicU64,
    /// Packets delivered to consumers
    pub packets_received: AtomicU64,
    /// Encoded bytes written
    pub bytes_sent: AtomicU64,
    /// Raw bytes read from transports
    pub bytes_received: AtomicU64,
    /// Decoder resynchronisations
    pub desyncs: AtomicU64,
    /// Packets dropped for digest or decryption failures
    pub integrity_failures: AtomicU64,
    /// Packets dropped for invariant violations
    pub invalid_packets: AtomicU64,
    /// Send operations that failed
    pub send_failures: AtomicU64,
    /// Successful authentications
    pub auth_success: AtomicU64,
    /// Rejected authentications
    pub auth_failures: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            desyncs: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            invalid_packets: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            auth_success: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn desync(&self) {
        self.desyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_packet(&self) {
        self.invalid_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_succeeded(&self) {
        self.auth_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_failed(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Uptime since this collector was created
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Log a one-line summary of all counters
    pub fn log_summary(&self) {
        info!(
            uptime_secs = self.uptime_secs(),
            sessions_opened = self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed = self.sessions_closed.load(Ordering::Relaxed),
            packets_sent = self.packets_sent.load(Ordering::Relaxed),
            packets_received = self.packets_received.load(Ordering::Relaxed),
            bytes_sent = self.bytes_sent.load(Ordering::Relaxed),
            bytes_received = self.bytes_received.load(Ordering::Relaxed),
            desyncs = self.desyncs.load(Ordering::Relaxed),
            integrity_failures = self.integrity_failures.load(Ordering::Relaxed),
            invalid_packets = self.invalid_packets.load(Ordering::Relaxed),
            "metrics summary"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
