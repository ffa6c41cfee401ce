//! DNS-over-TLS upstream (RFC 7858).
//! Every call opens a fresh TCP connection and does a full handshake.
//! Nothing is pooled and TLS session resumption is disabled.

use super::error::RelayError;
use async_trait::async_trait;
use rustls::pki_types::ServerName;
use std::{fmt::Display, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_rustls::{client::TlsStream, TlsConnector};

/// Opens secure channels to the upstream resolver.
#[async_trait]
pub trait UpstreamConnector: Send + Sync + 'static {
    type Channel: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens a new channel. Never hands out a channel twice.
    async fn connect(&self) -> Result<Self::Channel, RelayError>;

    /// Read/write timeout for the exchange on an opened channel.
    fn timeout(&self) -> Duration;

    /// Upstream identity for log lines.
    fn describe(&self) -> String;
}

/// Where and how to reach the upstream resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    pub host: String,
    pub port: u16,
    /// Name used for SNI and certificate verification.
    pub tls_name: String,
    pub timeout: Duration,
}

impl UpstreamSettings {
    pub fn new(host: String, port: u16, tls_name: Option<String>, timeout: Duration) -> Self {
        let tls_name = tls_name.unwrap_or_else(|| host.clone());
        Self {
            host,
            port,
            tls_name,
            timeout,
        }
    }
}

impl Display for UpstreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tls_name == self.host {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            write!(f, "{}:{} ({})", self.host, self.port, self.tls_name)
        }
    }
}

/// Connects to the upstream over TLS, verifying against the webpki root store.
#[derive(Clone)]
pub struct TlsUpstream {
    settings: UpstreamSettings,
    server_name: ServerName<'static>,
    connector: TlsConnector,
}

impl TlsUpstream {
    pub fn new(settings: UpstreamSettings) -> Result<Self, RelayError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_root_store(settings, root_store)
    }

    /// Trusts only the certificates in `root_store`.
    pub(super) fn with_root_store(
        settings: UpstreamSettings,
        root_store: rustls::RootCertStore,
    ) -> Result<Self, RelayError> {
        let server_name = ServerName::try_from(settings.tls_name.clone())
            .map_err(|_| RelayError::InvalidServerName(settings.tls_name.clone()))?;

        let mut config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        config.resumption = rustls::client::Resumption::disabled();

        Ok(Self {
            settings,
            server_name,
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    async fn connect_and_handshake(&self) -> Result<TlsStream<TcpStream>, RelayError> {
        let tcp_stream = TcpStream::connect((self.settings.host.as_str(), self.settings.port))
            .await
            .map_err(RelayError::Connect)?;
        tcp_stream.set_nodelay(true).map_err(RelayError::Connect)?;

        let tls_stream = self
            .connector
            .connect(self.server_name.clone(), tcp_stream)
            .await
            .map_err(classify_handshake_error)?;
        Ok(tls_stream)
    }
}

#[async_trait]
impl UpstreamConnector for TlsUpstream {
    type Channel = TlsStream<TcpStream>;

    async fn connect(&self) -> Result<Self::Channel, RelayError> {
        let tls_stream = tokio::time::timeout(self.settings.timeout, self.connect_and_handshake())
            .await
            .map_err(|_| RelayError::ConnectTimeout)??;

        let (_, session) = tls_stream.get_ref();
        let chain_len = session.peer_certificates().map(|chain| chain.len()).unwrap_or(0);
        tracing::debug!(
            "TLS session with {} established. version={:?} peer_certificates={chain_len}",
            self.settings,
            session.protocol_version()
        );
        Ok(tls_stream)
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn describe(&self) -> String {
        self.settings.to_string()
    }
}

/// Certificate problems are verification errors. Everything else is a connect error.
fn classify_handshake_error(err: std::io::Error) -> RelayError {
    let is_certificate_error = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some_and(|tls_err| matches!(tls_err, rustls::Error::InvalidCertificate(_)));

    if is_certificate_error {
        RelayError::TlsVerification(err)
    } else {
        RelayError::Connect(err)
    }
}
