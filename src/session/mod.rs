//! # Session Driver
//!
//! The state and tasks associated with one live connection.
//!
//! A session owns exactly one receive task, which reads transport bytes
//! into a scratch buffer, drives the frame decoder, routes completed frames
//! through the inbound pipeline, and delivers packets on a bounded event
//! channel. Sends may come from any number of tasks; they are serialised by
//! a per-session write mutex and carry a per-operation deadline.
//!
//! Lifecycle: `Connecting → Handshaking → Authenticating → Ready →
//! Draining → Closed`, one-way except `Ready → Draining` on graceful
//! shutdown. The first two states belong to the transport helpers (TCP
//! connect, TLS handshake); a spawned session starts at `Authenticating`.
//!
//! Failure semantics:
//! - transport errors close the session; pending sends fail `NotConnected`
//! - framing errors resync the decoder and the session continues
//! - cipher errors drop the packet and the session continues
//! - cancellation aborts the receive loop at the next read boundary and is
//!   observed by sends before they acquire the write lock

mod event;

pub use event::{CloseReason, SessionEvent};

use crate::config::LinkConfig;
use crate::core::packet::{Packet, PacketKind};
use crate::core::pipeline::TransformContext;
use crate::core::receiver::{FrameDecoder, ReceiveEvent};
use crate::error::{Result, WireError};
use crate::utils::Metrics;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, instrument, warn};

/// Which side of the connection this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Server,
    Client,
}

/// Session lifecycle states. Transitions are one-way except
/// `Ready → Draining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// TCP connect in progress (transport helpers)
    Connecting = 0,
    /// TLS handshake in progress (transport helpers)
    Handshaking = 1,
    /// Waiting for the initial Auth exchange
    Authenticating = 2,
    /// Packets flow in both directions
    Ready = 3,
    /// Graceful shutdown requested; no new sends accepted
    Draining = 4,
    /// Terminal
    Closed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Handshaking,
            2 => SessionState::Authenticating,
            3 => SessionState::Ready,
            4 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Shared {
    writer: Mutex<Option<BoxedWriter>>,
    state: AtomicU8,
    stop_tx: watch::Sender<bool>,
    ctx: TransformContext,
    write_deadline: Duration,
    events_tx: mpsc::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
    role: SessionRole,
    client_id: Option<String>,
    peer: String,
}

/// Handle to one live connection. Cheap to clone; all clones drive the same
/// underlying session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Spawn a session over a ready byte stream (TCP, TLS, or an in-memory
    /// duplex in tests). Returns the handle and the event channel; the
    /// channel capacity is `server.backpressure_limit`, and reads pause
    /// while it is full.
    pub fn spawn<S>(
        stream: S,
        role: SessionRole,
        config: &LinkConfig,
        metrics: Arc<Metrics>,
        peer: impl Into<String>,
    ) -> (Session, mpsc::Receiver<SessionEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let peer = peer.into();
        let (reader, writer) = tokio::io::split(stream);
        let (events_tx, events_rx) =
            mpsc::channel(config.server.backpressure_limit.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            writer: Mutex::new(Some(Box::new(writer) as BoxedWriter)),
            state: AtomicU8::new(SessionState::Authenticating as u8),
            stop_tx,
            ctx: TransformContext::new(&config.transport),
            write_deadline: config.transport.write_deadline,
            events_tx,
            metrics,
            role,
            client_id: config.client.client_id.clone(),
            peer,
        });
        shared.metrics.session_opened();

        let session = Session {
            shared: shared.clone(),
        };
        tokio::spawn(recv_loop(
            reader,
            shared,
            stop_rx,
            config.transport.read_buffer_bytes,
            config.transport.idle_timeout,
        ));

        (session, events_rx)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state_now()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Peer label used in logs
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    /// Client side: send the opening Auth packet. Acceptance is implicit:
    /// the peer either keeps the connection or closes it.
    #[instrument(skip(self), fields(peer = %self.shared.peer))]
    pub async fn authenticate(&self) -> Result<()> {
        let digest = self.shared.ctx.preshared_hex().unwrap_or("").to_string();
        let packet = Packet::auth(&digest, self.shared.client_id.as_deref())?;
        self.send(packet).await?;
        self.shared.promote_to_ready();
        debug!("auth packet sent");
        Ok(())
    }

    /// Encode a packet through the outbound pipeline and write it to the
    /// transport. Concurrent callers are serialised by the write lock, and
    /// cancellation is observed before the lock is acquired.
    ///
    /// # Errors
    /// - `WireError::NotConnected` when the session is not accepting sends
    /// - `WireError::Cancelled` when cancellation was requested
    /// - `WireError::TooLarge` when the packet exceeds the caps
    /// - `WireError::Timeout` when the write deadline expires
    /// - `WireError::Disconnected` when the transport write fails
    pub async fn send(&self, packet: Packet) -> Result<()> {
        let shared = &self.shared;

        if *shared.stop_tx.borrow() {
            return Err(WireError::Cancelled);
        }
        match shared.state_now() {
            SessionState::Authenticating | SessionState::Ready => {}
            _ => return Err(WireError::NotConnected),
        }

        let bytes = shared.ctx.seal(packet)?;

        let mut guard = shared.writer.lock().await;
        if *shared.stop_tx.borrow() {
            return Err(WireError::Cancelled);
        }
        let Some(writer) = guard.as_mut() else {
            return Err(WireError::NotConnected);
        };

        let wrote = tokio::time::timeout(shared.write_deadline, async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        })
        .await;

        match wrote {
            Ok(Ok(())) => {
                shared.metrics.packet_sent(bytes.len());
                Ok(())
            }
            Ok(Err(e)) => {
                drop(guard);
                shared.metrics.send_failure();
                let _ = shared
                    .events_tx
                    .try_send(SessionEvent::MessageFailed(e.to_string()));
                shared
                    .close(CloseReason::TransportError(e.to_string()))
                    .await;
                Err(WireError::Disconnected)
            }
            Err(_) => {
                drop(guard);
                shared.metrics.send_failure();
                let _ = shared
                    .events_tx
                    .try_send(SessionEvent::MessageFailed("write deadline expired".into()));
                shared
                    .close(CloseReason::TransportError("write deadline expired".into()))
                    .await;
                Err(WireError::Timeout)
            }
        }
    }

    /// Request cancellation: the receive loop stops at its next read
    /// boundary and pending sends fail with `Cancelled`.
    pub async fn cancel(&self) {
        self.shared.close(CloseReason::Cancelled).await;
    }

    /// Graceful shutdown: stop accepting sends, then close.
    #[instrument(skip(self), fields(peer = %self.shared.peer))]
    pub async fn shutdown(&self) {
        let _ = self.shared.state.compare_exchange(
            SessionState::Ready as u8,
            SessionState::Draining as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.shared.close(CloseReason::Shutdown).await;
    }
}

impl Shared {
    fn state_now(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn promote_to_ready(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Authenticating as u8,
            SessionState::Ready as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    async fn close(&self, reason: CloseReason) {
        let prev = self
            .state
            .swap(SessionState::Closed as u8, Ordering::SeqCst);
        if prev == SessionState::Closed as u8 {
            return;
        }
        let _ = self.stop_tx.send(true);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        self.metrics.session_closed();
        info!(peer = %self.peer, ?reason, "session closed");
        let _ = self.events_tx.try_send(SessionEvent::Closed(reason));
    }

    /// Route one decoded, opened packet. Returns false when the session
    /// should stop receiving.
    async fn handle_packet(&self, packet: Packet) -> bool {
        if self.state_now() == SessionState::Authenticating {
            match self.role {
                SessionRole::Server => return self.handle_server_auth(packet).await,
                SessionRole::Client => {
                    // Any inbound packet implies the server accepted us
                    self.promote_to_ready();
                }
            }
        }

        self.metrics.packet_received();
        self.events_tx
            .send(SessionEvent::Packet(packet))
            .await
            .is_ok()
    }

    async fn handle_server_auth(&self, packet: Packet) -> bool {
        let expected = self.ctx.preshared_hex();

        if let Some(expected) = expected {
            // A configured secret makes the Auth exchange mandatory
            let presented = packet
                .headers
                .get(crate::core::packet::keys::PRESHARED_HASH);
            if packet.kind != PacketKind::Auth || presented != Some(expected) {
                self.metrics.auth_failed();
                warn!(peer = %self.peer, "authentication rejected");
                self.close(CloseReason::AuthRejected).await;
                return false;
            }
            self.accept_auth(&packet).await
        } else if packet.kind == PacketKind::Auth {
            self.accept_auth(&packet).await
        } else {
            // No secret configured: the first packet of any kind promotes
            // the session and is delivered normally.
            self.promote_to_ready();
            self.metrics.packet_received();
            self.events_tx
                .send(SessionEvent::Packet(packet))
                .await
                .is_ok()
        }
    }

    async fn accept_auth(&self, packet: &Packet) -> bool {
        self.promote_to_ready();
        self.metrics.auth_succeeded();
        let client_id = packet.client_id().map(str::to_string);
        debug!(peer = %self.peer, ?client_id, "peer authenticated");
        self.events_tx
            .send(SessionEvent::Authenticated { client_id })
            .await
            .is_ok()
    }
}

async fn recv_loop<R>(
    mut reader: R,
    shared: Arc<Shared>,
    mut stop_rx: watch::Receiver<bool>,
    read_buffer_bytes: usize,
    idle_timeout: Duration,
) where
    R: AsyncRead + Send + Unpin,
{
    let mut scratch = vec![0u8; read_buffer_bytes.max(1)];
    let mut decoder = FrameDecoder::new(shared.ctx.limits().clone());

    'outer: loop {
        let read = tokio::select! {
            _ = stop_rx.changed() => {
                shared.close(CloseReason::Cancelled).await;
                break;
            }
            r = tokio::time::timeout(idle_timeout, reader.read(&mut scratch)) => r,
        };

        let n = match read {
            Err(_) => {
                shared.close(CloseReason::IdleTimeout).await;
                break;
            }
            Ok(Ok(0)) => {
                shared.close(CloseReason::Remote).await;
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                shared
                    .close(CloseReason::TransportError(e.to_string()))
                    .await;
                break;
            }
        };

        shared.metrics.bytes_read(n);
        for event in decoder.feed(&scratch[..n]) {
            match event {
                ReceiveEvent::PacketReady(frame) => match shared.ctx.open(frame) {
                    Ok(packet) => {
                        if !shared.handle_packet(packet).await {
                            break 'outer;
                        }
                    }
                    Err(WireError::WrongKey) | Err(WireError::DecryptionFailure) => {
                        shared.metrics.integrity_failure();
                        // During the auth exchange an unverifiable packet is
                        // a rejection, not a droppable frame
                        if shared.role == SessionRole::Server
                            && shared.state_now() == SessionState::Authenticating
                        {
                            shared.metrics.auth_failed();
                            warn!(peer = %shared.peer, "authentication rejected: integrity failure");
                            shared.close(CloseReason::AuthRejected).await;
                            break 'outer;
                        }
                        warn!(peer = %shared.peer, "packet dropped: integrity failure");
                        let _ = shared.events_tx.try_send(SessionEvent::IntegrityFailure);
                    }
                    Err(e) => {
                        shared.metrics.invalid_packet();
                        warn!(peer = %shared.peer, error = %e, "packet dropped");
                        let _ = shared.events_tx.try_send(SessionEvent::InvalidPacket);
                    }
                },
                ReceiveEvent::Desync => {
                    shared.metrics.desync();
                    warn!(peer = %shared.peer, "frame desync, resynchronising");
                    let _ = shared.events_tx.try_send(SessionEvent::Desync);
                }
                ReceiveEvent::NeedMore => {}
            }
        }
    }

    // No-op unless the loop ended because the event consumer went away
    shared.close(CloseReason::Cancelled).await;
}
