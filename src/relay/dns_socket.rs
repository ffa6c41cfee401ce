use super::{
    admission::Admission,
    error::RelayError,
    exchange::exchange,
    query_summary::QuerySummary,
    rate_limiter::{RateLimiter, RateLimiterBuilder},
    response_gate::{admit, Decision, DropReason, MIN_MESSAGE_LEN},
    upstream::UpstreamConnector,
};
use crate::config::Relay;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::UdpSocket,
    sync::oneshot,
    task::JoinHandle,
};

/**
 * UDP socket that relays every datagram to the upstream resolver
 * and sends the answer back to the client.
 */
pub struct RelaySocket<C: UpstreamConnector> {
    socket: Arc<UdpSocket>,
    connector: Arc<C>,
    admission: Admission,
    rate_limiter: Arc<RateLimiter>,
    receive_window: usize,
}

impl<C: UpstreamConnector> RelaySocket<C> {
    /// Binds the listening socket. Failing to bind is fatal for the caller.
    pub async fn new(listening: SocketAddr, connector: C, settings: &Relay) -> tokio::io::Result<Self> {
        let socket = UdpSocket::bind(listening).await?;
        let rate_limiter = RateLimiterBuilder::new()
            .max_per_second(settings.query_rate_limit)
            .burst_size(settings.query_rate_limit_burst)
            .build();
        if rate_limiter.is_enabled() {
            tracing::info!(
                "Rate limit {} queries/s per client, burst {}.",
                settings.query_rate_limit,
                settings.query_rate_limit_burst
            );
        }

        Ok(Self {
            socket: Arc::new(socket),
            connector: Arc::new(connector),
            admission: Admission::new(settings.max_in_flight),
            rate_limiter: Arc::new(rate_limiter),
            receive_window: settings.receive_window,
        })
    }

    pub fn local_addr(&self) -> tokio::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Starts the receive loop in the background.
    /// The loop owns this socket. Stopping it closes the listener.
    pub fn start_receive_loop(self) -> RelayHandle {
        let (tx, rx) = oneshot::channel::<()>();
        let join_handle = tokio::spawn(async move {
            let mut cancel = rx;
            loop {
                tokio::select! {
                    _ = &mut cancel => {
                        tracing::trace!("Stop UDP receive loop.");
                        break;
                    }
                    result = self.receive_datagram() => {
                        if let Err(err) = result {
                            tracing::error!("Error while trying to receive. {err}");
                        }
                    }
                }
            }
        });
        RelayHandle {
            shutdown: tx,
            join_handle,
        }
    }

    async fn receive_datagram(&self) -> tokio::io::Result<()> {
        let mut buffer = vec![0u8; self.receive_window];
        let (size, from) = self.socket.recv_from(&mut buffer).await?;
        buffer.truncate(size);
        self.dispatch(buffer, from);
        Ok(())
    }

    /// Hands the query to its own task. Never waits for it.
    fn dispatch(&self, query: Vec<u8>, from: SocketAddr) {
        if self.rate_limiter.check_is_limited_and_increase(&from.ip()) {
            tracing::debug!("Rate limited {from}. Drop.");
            return;
        }

        let permit = match self.admission.try_admit() {
            Some(permit) => permit,
            None => {
                tracing::warn!("Too many queries in flight. Drop query from {from}.");
                return;
            }
        };

        let connector = self.connector.clone();
        let socket = self.socket.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let _ = handle_query(connector.as_ref(), &socket, query, from).await;
        });
    }
}

/// Stops a running receive loop.
#[derive(Debug)]
pub struct RelayHandle {
    shutdown: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl RelayHandle {
    /// Signals the loop and waits until it has released the listening socket.
    /// Queries already in flight run to completion.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join_handle.await {
            tracing::error!("UDP receive loop ended abnormally. {err}");
        }
    }
}

/// Relays one query and replies to `from` on `socket`.
///
/// Every failure is logged here and nothing is sent to the client.
/// Returns the number of bytes sent to the client.
pub async fn handle_query<C: UpstreamConnector>(
    connector: &C,
    socket: &UdpSocket,
    query: Vec<u8>,
    from: SocketAddr,
) -> Result<usize, RelayError> {
    let start = Instant::now();
    let summary = QuerySummary::new(&query);
    let result = relay_query(connector, socket, &query, from).await;
    let elapsed = start.elapsed().as_millis();

    match &result {
        Ok(sent) => tracing::debug!("{from} {summary} answered with {sent} bytes within {elapsed}ms."),
        Err(RelayError::MalformedQuery) => tracing::debug!("{from} {summary} dropped. {}", RelayError::MalformedQuery),
        Err(err) => tracing::warn!(
            "{from} {summary} via {} failed after {elapsed}ms. kind={} {err}",
            connector.describe(),
            err.kind()
        ),
    }
    result
}

async fn relay_query<C: UpstreamConnector>(
    connector: &C,
    socket: &UdpSocket,
    query: &[u8],
    from: SocketAddr,
) -> Result<usize, RelayError> {
    let mut channel = connector.connect().await?;
    let exchanged = exchange(&mut channel, query, connector.timeout()).await;
    close_session(channel, connector).await;
    let framed_response = exchanged?;

    match admit(&framed_response) {
        Decision::Forward(answer) => Ok(socket.send_to(&answer, from).await?),
        Decision::Drop(DropReason::MalformedQuery) => Err(RelayError::MalformedQuery),
        Decision::Drop(DropReason::MissingHeader) => Err(RelayError::TruncatedResponse {
            expected: MIN_MESSAGE_LEN,
            received: framed_response.len().saturating_sub(2),
        }),
    }
}

/// Consumes the channel so a session can only be closed once.
async fn close_session<S, C>(mut channel: S, connector: &C)
where
    S: AsyncWrite + Unpin,
    C: UpstreamConnector,
{
    match tokio::time::timeout(connector.timeout(), channel.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::trace!("Closing upstream session failed. {err}"),
        Err(_) => tracing::trace!("Closing upstream session timed out."),
    }
}
