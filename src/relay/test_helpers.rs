//! Loopback upstream for relay tests. Plain TCP, or TLS with a self-signed certificate.

use super::{
    error::RelayError,
    upstream::{TlsUpstream, UpstreamConnector, UpstreamSettings},
};
use async_trait::async_trait;
use rustls::{
    pki_types::{CertificateDer, PrivatePkcs8KeyDer},
    RootCertStore,
};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
};
use tokio_rustls::TlsAcceptor;

/// Name the TLS resolver's certificate is issued for.
pub const RESOLVER_TLS_NAME: &str = "localhost";

/// Connects to a `MockResolver` and counts the sessions it opened.
#[derive(Debug, Clone)]
pub struct PlainTcpConnector {
    addr: SocketAddr,
    sessions: Arc<AtomicUsize>,
}

#[async_trait]
impl UpstreamConnector for PlainTcpConnector {
    type Channel = TcpStream;

    async fn connect(&self) -> Result<Self::Channel, RelayError> {
        let stream = TcpStream::connect(self.addr).await.map_err(RelayError::Connect)?;
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(stream)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn describe(&self) -> String {
        format!("mock {}", self.addr)
    }
}

#[derive(Debug, Default)]
pub struct MockStats {
    connections: AtomicUsize,
    clean_closes: AtomicUsize,
    queries: Mutex<Vec<Vec<u8>>>,
    queries_per_session: Mutex<Vec<usize>>,
}

impl MockStats {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sessions the relay closed between two messages. Over TLS this means close_notify was sent.
    pub fn clean_closes(&self) -> usize {
        self.clean_closes.load(Ordering::SeqCst)
    }

    /// Raw queries, length prefix removed.
    pub fn received_queries(&self) -> Vec<Vec<u8>> {
        self.queries.lock().unwrap().clone()
    }

    /// One entry per session the relay closed.
    pub fn queries_per_session(&self) -> Vec<usize> {
        self.queries_per_session.lock().unwrap().clone()
    }

    pub async fn wait_for_closed_sessions(&self, count: usize, timeout: Duration) {
        let start = Instant::now();
        while self.queries_per_session.lock().unwrap().len() < count && start.elapsed() < timeout {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// DNS-over-TCP resolver on loopback.
///
/// `respond` gets the raw query and returns the bytes to write back, prefix included.
/// An empty response closes the connection without answering.
pub struct MockResolver {
    pub addr: SocketAddr,
    pub stats: Arc<MockStats>,
    sessions: Arc<AtomicUsize>,
    certificate: Option<CertificateDer<'static>>,
}

impl MockResolver {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::start_with_delay(Duration::ZERO, respond).await
    }

    pub async fn start_with_delay<F>(delay: Duration, respond: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(MockStats::default());
        let respond = Arc::new(respond);

        let accept_stats = stats.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_stats.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_session(stream, delay, respond.clone(), accept_stats.clone()));
            }
        });

        Self {
            addr,
            stats,
            sessions: Arc::new(AtomicUsize::new(0)),
            certificate: None,
        }
    }

    /// DNS-over-TLS resolver with a fresh self-signed certificate for `RESOLVER_TLS_NAME`.
    /// Only handshakes that complete count as connections.
    pub async fn start_tls<F>(respond: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        let certified = rcgen::generate_simple_self_signed(vec![RESOLVER_TLS_NAME.to_string()]).unwrap();
        let certificate = certified.cert.der().clone();
        let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![certificate.clone()], key.into())
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(MockStats::default());
        let respond = Arc::new(respond);

        let accept_stats = stats.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let respond = respond.clone();
                let stats = accept_stats.clone();
                tokio::spawn(async move {
                    if let Ok(stream) = acceptor.accept(stream).await {
                        stats.connections.fetch_add(1, Ordering::SeqCst);
                        serve_session(stream, Duration::ZERO, respond, stats).await;
                    }
                });
            }
        });

        Self {
            addr,
            stats,
            sessions: Arc::new(AtomicUsize::new(0)),
            certificate: Some(certificate),
        }
    }

    /// Root store that trusts this resolver's certificate. Empty for plain TCP.
    pub fn trusted_roots(&self) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        if let Some(certificate) = &self.certificate {
            roots.add(certificate.clone()).unwrap();
        }
        roots
    }

    /// Real TLS connector that trusts this resolver and verifies against `tls_name`.
    pub fn tls_upstream(&self, tls_name: &str) -> TlsUpstream {
        let settings = UpstreamSettings::new(
            self.addr.ip().to_string(),
            self.addr.port(),
            Some(tls_name.to_string()),
            Duration::from_secs(2),
        );
        TlsUpstream::with_root_store(settings, self.trusted_roots()).unwrap()
    }

    pub fn connector(&self) -> PlainTcpConnector {
        PlainTcpConnector {
            addr: self.addr,
            sessions: self.sessions.clone(),
        }
    }

    /// Sessions opened by connectors of this resolver.
    pub fn connector_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

async fn serve_session<S, F>(mut stream: S, delay: Duration, respond: Arc<F>, stats: Arc<MockStats>)
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
{
    let mut served = 0;
    loop {
        let mut prefix = [0u8; 2];
        match stream.read(&mut prefix[..1]).await {
            Ok(0) => {
                stats.clean_closes.fetch_add(1, Ordering::SeqCst);
                break;
            }
            Ok(_) => {}
            Err(_) => break,
        }
        if stream.read_exact(&mut prefix[1..]).await.is_err() {
            break;
        }
        let mut query = vec![0u8; u16::from_be_bytes(prefix) as usize];
        if stream.read_exact(&mut query).await.is_err() {
            break;
        }
        served += 1;
        stats.queries.lock().unwrap().push(query.clone());

        tokio::time::sleep(delay).await;
        let response = respond(&query);
        if response.is_empty() {
            break;
        }
        if stream.write_all(&response).await.is_err() {
            break;
        }
    }
    stats.queries_per_session.lock().unwrap().push(served);
}

/// 16 byte answer to `query` with the given RCODE, framed.
pub fn framed_answer(query: &[u8], rcode: u8) -> Vec<u8> {
    let mut message = vec![0u8; 16];
    message[..2].copy_from_slice(&query[..2]);
    message[2] = 0x81;
    message[3] = 0x80 | (rcode & 0x0F);
    let copied = query.len().min(14);
    if copied > 4 {
        message[4..copied].copy_from_slice(&query[4..copied]);
    }
    message[14] = 0xC0;
    message[15] = 0x0C;

    let mut framed = vec![0x00, 0x10];
    framed.extend_from_slice(&message);
    framed
}

/// Next datagram on `client`, or None if nothing arrives in time.
pub async fn recv_reply(client: &UdpSocket, wait: Duration) -> Option<Vec<u8>> {
    let mut buffer = [0u8; 1024];
    match tokio::time::timeout(wait, client.recv_from(&mut buffer)).await {
        Ok(Ok((size, _))) => Some(buffer[..size].to_vec()),
        _ => None,
    }
}
