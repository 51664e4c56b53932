//! Message-oriented, full-duplex transports.
//!
//! A [`Transport`] is anything that is both a `Stream` of inbound binary
//! frames and a `Sink` for outbound ones. Two implementations ship here:
//!
//! - [`WebSocketTransport`], opened by [`WebSocketConnector`], carries
//!   frames as binary WebSocket messages. Ping/pong is answered by
//!   tungstenite; a close frame ends the stream.
//! - [`MemoryTransport`], created in pairs by [`duplex`], for in-process
//!   peers (tests, loopback servers).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use futures_util::sink::Sink;
use futures_util::stream::Stream;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── Transport ────────────────────────────────────────────────────────

/// A bidirectional binary frame channel.
///
/// Blanket-implemented for every type with the right `Stream` + `Sink`
/// shape, so adapters never need to opt in.
pub trait Transport:
    Stream<Item = Result<Bytes, Error>> + Sink<Bytes, Error = Error> + Send + Unpin + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Bytes, Error>> + Sink<Bytes, Error = Error> + Send + Unpin + 'static
{
}

// ── Endpoint ─────────────────────────────────────────────────────────

/// Where the control server listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The `ws://` URL for this endpoint. IPv6 literals are bracketed.
    pub fn url(&self) -> Result<Url, Error> {
        Ok(Url::parse(&format!("ws://{self}/"))?)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Opens a fresh transport to an endpoint. Called once per connection
/// attempt.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Transport, Error>> + Send;
}

/// Opens [`WebSocketTransport`]s.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Upper bound on TCP connect + WebSocket upgrade. Default: 10s.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, endpoint: &Endpoint) -> Result<WebSocketTransport, Error> {
        let url = endpoint.url()?;
        tracing::info!(url = %url, "Connecting to WebSocket");

        let connect_error = |reason: String| Error::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let (inner, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    connect_error(format!(
                        "timed out after {}s",
                        self.connect_timeout.as_secs()
                    ))
                })?
                .map_err(|e| connect_error(e.to_string()))?;

        tracing::info!("WebSocket connected");
        Ok(WebSocketTransport { inner })
    }
}

// ── WebSocketTransport ───────────────────────────────────────────────

/// A WebSocket connection carrying binary frames.
pub struct WebSocketTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Stream for WebSocketTransport {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let frame = ready!(Pin::new(&mut self.inner).poll_next(cx));
            match frame {
                Some(Ok(Message::Binary(data))) => return Poll::Ready(Some(Ok(data))),
                Some(Ok(Message::Text(text))) => {
                    return Poll::Ready(Some(Ok(Bytes::copy_from_slice(text.as_bytes()))));
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        tracing::info!(
                            code = %cf.code,
                            reason = %cf.reason,
                            "WebSocket close frame received"
                        );
                    } else {
                        tracing::info!("WebSocket close frame received (no payload)");
                    }
                    return Poll::Ready(None);
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite queues the pong reply itself
                    tracing::trace!("WebSocket ping");
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                ))
                | None => {
                    tracing::info!("WebSocket stream ended");
                    return Poll::Ready(None);
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(Error::Transport(e.to_string())))),
            }
        }
    }
}

impl Sink<Bytes> for WebSocketTransport {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.inner).poll_ready(cx).map_err(ws_error)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<(), Error> {
        Pin::new(&mut self.inner)
            .start_send(Message::Binary(item))
            .map_err(ws_error)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(ws_error)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.inner).poll_close(cx).map_err(ws_error)
    }
}

#[allow(clippy::needless_pass_by_value)]
fn ws_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => Error::Closed,
        other => Error::Transport(other.to_string()),
    }
}

// ── MemoryTransport ──────────────────────────────────────────────────

/// One end of an in-process frame pipe.
///
/// Dropping (or closing) one end ends the other end's stream, the same
/// way a remote close does.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

/// Create a connected pair of [`MemoryTransport`]s.
pub fn duplex() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            tx: Some(a_tx),
            rx: a_rx,
        },
        MemoryTransport {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

impl Stream for MemoryTransport {
    type Item = Result<Bytes, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

impl Sink<Bytes> for MemoryTransport {
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        match self.tx {
            Some(ref tx) if !tx.is_closed() => Poll::Ready(Ok(())),
            _ => Poll::Ready(Err(Error::Closed)),
        }
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Error> {
        self.tx
            .as_ref()
            .ok_or(Error::Closed)?
            .send(item)
            .map_err(|_| Error::Closed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        self.tx = None;
        Poll::Ready(Ok(()))
    }
}

// ── Tests ────────────────────────────────────────────────────────────
