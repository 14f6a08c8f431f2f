//! TCP transport acquisition.
//!
//! The server accept loop spawns one session per connection and hands it to
//! the caller over a channel; the core never touches sockets beyond this
//! point. Graceful shutdown drains active sessions up to the configured
//! timeout, mirroring the signal-select loop used across the stack.

use crate::config::LinkConfig;
use crate::error::{Result, WireError};
use crate::session::{Session, SessionEvent, SessionRole};
use crate::utils::Metrics;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

/// A freshly accepted connection: the session handle and its event channel.
pub struct Incoming {
    pub session: Session,
    pub events: mpsc::Receiver<SessionEvent>,
    pub peer: SocketAddr,
}

fn active_sessions(metrics: &Metrics) -> u64 {
    let opened = metrics.sessions_opened.load(Ordering::Relaxed);
    let closed = metrics.sessions_closed.load(Ordering::Relaxed);
    opened.saturating_sub(closed)
}

/// Run a TCP server until the shutdown channel fires.
///
/// Each accepted connection becomes an [`Incoming`] on `incoming_tx`.
/// Connections beyond `server.max_connections` are dropped at accept.
#[instrument(skip(config, metrics, incoming_tx, shutdown_rx), fields(address = %config.server.address))]
pub async fn start_server(
    config: LinkConfig,
    metrics: Arc<Metrics>,
    incoming_tx: mpsc::Sender<Incoming>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(&config.server.address).await?;
    info!("listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                drain_sessions(&metrics, config.server.shutdown_timeout).await;
                return Ok(());
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        if active_sessions(&metrics) >= config.server.max_connections as u64 {
                            warn!(%peer, "connection limit reached, rejecting");
                            drop(stream);
                            continue;
                        }

                        let _ = stream.set_nodelay(true);
                        let (session, events) = Session::spawn(
                            stream,
                            SessionRole::Server,
                            &config,
                            metrics.clone(),
                            peer.to_string(),
                        );
                        info!(%peer, "connection accepted");

                        if incoming_tx.send(Incoming { session, events, peer }).await.is_err() {
                            // Caller stopped consuming; nothing left to serve
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "error accepting connection");
                    }
                }
            }
        }
    }
}

/// Wait for active sessions to close, up to the shutdown timeout.
async fn drain_sessions(metrics: &Metrics, timeout: Duration) {
    info!("shutting down, waiting for sessions to close");
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                let active = active_sessions(metrics);
                if active == 0 {
                    info!("all sessions closed");
                    return;
                }
                info!(active, "waiting for sessions to close");
            }
        }
    }
}

/// Connect to a server, spawn the client session, and authenticate.
#[instrument(skip(config, metrics), fields(address = %config.client.address))]
pub async fn connect(
    config: &LinkConfig,
    metrics: Arc<Metrics>,
) -> Result<(Session, mpsc::Receiver<SessionEvent>)> {
    let stream = tokio::time::timeout(
        config.client.connection_timeout,
        TcpStream::connect(&config.client.address),
    )
    .await
    .map_err(|_| WireError::Timeout)??;
    let _ = stream.set_nodelay(true);

    let (session, events) = Session::spawn(
        stream,
        SessionRole::Client,
        config,
        metrics,
        config.client.address.clone(),
    );
    session.authenticate().await?;
    info!("connected");
    Ok((session, events))
}
