//! TLS transport acquisition.
//!
//! Wraps accepted and dialled TCP streams in rustls before the session
//! driver sees them; the session consumes a plain byte stream either way.
//! A TLS handshake failure is terminal for that connection; there is no
//! resynchronisation below the framing layer.

use crate::config::LinkConfig;
use crate::error::{Result, WireError};
use crate::session::{Session, SessionEvent, SessionRole};
use crate::utils::Metrics;
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig, ServerName};
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{error, info, instrument, warn};

use super::tcp::Incoming;

/// Server-side certificate configuration.
pub struct TlsServerConfig {
    cert_path: String,
    key_path: String,
}

impl TlsServerConfig {
    pub fn new<P: AsRef<Path>>(cert_path: P, key_path: P) -> Self {
        Self {
            cert_path: cert_path.as_ref().to_string_lossy().to_string(),
            key_path: key_path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Generate a self-signed certificate for development and testing.
    pub fn generate_self_signed<P: AsRef<Path>>(cert_path: P, key_path: P) -> io::Result<Self> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()])
            .map_err(|e| io::Error::other(format!("Certificate generation error: {e}")))?;

        let mut cert_file = File::create(&cert_path)?;
        cert_file.write_all(cert.cert.pem().as_bytes())?;

        let mut key_file = File::create(&key_path)?;
        key_file.write_all(cert.signing_key.serialize_pem().as_bytes())?;

        Ok(Self::new(cert_path, key_path))
    }

    /// Load certificate and key into a rustls server configuration.
    pub fn load_server_config(&self) -> Result<ServerConfig> {
        let cert_file = File::open(&self.cert_path)
            .map_err(|e| WireError::TlsError(format!("Failed to open cert file: {e}")))?;
        let mut cert_reader = BufReader::new(cert_file);
        let cert_chain: Vec<Certificate> = certs(&mut cert_reader)
            .map_err(|_| WireError::TlsError("Failed to parse certificate".into()))?
            .into_iter()
            .map(Certificate)
            .collect();

        let key_file = File::open(&self.key_path)
            .map_err(|e| WireError::TlsError(format!("Failed to open key file: {e}")))?;
        let mut key_reader = BufReader::new(key_file);
        let keys = pkcs8_private_keys(&mut key_reader)
            .map_err(|_| WireError::TlsError("Failed to parse private key".into()))?;
        let private_key = keys
            .first()
            .cloned()
            .map(PrivateKey)
            .ok_or_else(|| WireError::TlsError("No private keys found".into()))?;

        ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| WireError::TlsError(format!("TLS error: {e}")))
    }
}

/// Client-side TLS configuration.
pub struct TlsClientConfig {
    server_name: String,
    insecure: bool,
}

impl TlsClientConfig {
    pub fn new<S: Into<String>>(server_name: S) -> Self {
        Self {
            server_name: server_name.into(),
            insecure: false,
        }
    }

    /// Skip certificate verification. Development and testing only; the
    /// connection is still encrypted but the peer is unauthenticated.
    pub fn insecure(mut self) -> Self {
        warn!("TLS certificate verification disabled");
        self.insecure = true;
        self
    }

    /// Build the rustls client configuration.
    pub fn load_client_config(&self) -> Result<ClientConfig> {
        let builder = ClientConfig::builder().with_safe_defaults();

        if self.insecure {
            struct AcceptAnyServerCert;

            impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
                fn verify_server_cert(
                    &self,
                    _end_entity: &Certificate,
                    _intermediates: &[Certificate],
                    _server_name: &ServerName,
                    _scts: &mut dyn Iterator<Item = &[u8]>,
                    _ocsp_response: &[u8],
                    _now: std::time::SystemTime,
                ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error>
                {
                    Ok(rustls::client::ServerCertVerified::assertion())
                }
            }

            return Ok(builder
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
                .with_no_client_auth());
        }

        let mut root_store = RootCertStore::empty();
        let native_certs = rustls_native_certs::load_native_certs()
            .map_err(|e| WireError::TlsError(format!("Failed to load native certs: {e}")))?;
        for cert in native_certs {
            root_store
                .add(&Certificate(cert.0))
                .map_err(|e| WireError::TlsError(format!("Failed to add cert: {e}")))?;
        }

        Ok(builder
            .with_root_certificates(root_store)
            .with_no_client_auth())
    }

    /// The server name presented for SNI and verification.
    pub fn server_name(&self) -> Result<ServerName> {
        ServerName::try_from(self.server_name.as_str())
            .map_err(|_| WireError::TlsError("Invalid server name".into()))
    }
}

/// Run a TLS server until the shutdown channel fires. Handshakes run in
/// per-connection tasks so a slow peer cannot stall the accept loop.
#[instrument(skip_all, fields(address = %config.server.address))]
pub async fn start_server(
    config: LinkConfig,
    tls: TlsServerConfig,
    metrics: Arc<Metrics>,
    incoming_tx: mpsc::Sender<Incoming>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(Arc::new(tls.load_server_config()?));
    let listener = TcpListener::bind(&config.server.address).await?;
    info!("TLS server listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("TLS server shutting down");
                return Ok(());
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "error accepting connection");
                        continue;
                    }
                };

                let acceptor = acceptor.clone();
                let incoming_tx = incoming_tx.clone();
                let metrics = metrics.clone();
                let config = config.clone();

                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let (session, events) = Session::spawn(
                                tls_stream,
                                SessionRole::Server,
                                &config,
                                metrics,
                                peer.to_string(),
                            );
                            info!(%peer, "TLS connection established");
                            let _ = incoming_tx.send(Incoming { session, events, peer }).await;
                        }
                        Err(e) => {
                            // Terminal for this connection; no resync below framing
                            error!(%peer, error = %e, "TLS handshake failed");
                        }
                    }
                });
            }
        }
    }
}

/// Dial a TLS server, spawn the client session, and authenticate.
#[instrument(skip(config, tls, metrics), fields(address = %config.client.address))]
pub async fn connect(
    config: &LinkConfig,
    tls: TlsClientConfig,
    metrics: Arc<Metrics>,
) -> Result<(Session, mpsc::Receiver<SessionEvent>)> {
    let connector = TlsConnector::from(Arc::new(tls.load_client_config()?));

    let stream = tokio::time::timeout(
        config.client.connection_timeout,
        TcpStream::connect(&config.client.address),
    )
    .await
    .map_err(|_| WireError::Timeout)??;
    let _ = stream.set_nodelay(true);

    let domain = tls.server_name()?;
    let tls_stream = connector
        .connect(domain, stream)
        .await
        .map_err(|e| WireError::TlsError(format!("TLS connection failed: {e}")))?;

    let (session, events) = Session::spawn(
        tls_stream,
        SessionRole::Client,
        config,
        metrics,
        config.client.address.clone(),
    );
    session.authenticate().await?;
    info!("TLS connected");
    Ok((session, events))
}
