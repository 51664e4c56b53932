//! JSON-RPC session over a sealed transport.
//!
//! [`session`] splits one authenticated transport into three parts:
//!
//! - [`RpcClient`]: a cheap, cloneable handle for issuing requests. Start
//!   and stop are fire-and-forget; snapshot fetches and delay changes wait
//!   for the correlated response.
//! - [`Notifications`]: the single receiver for server push messages.
//! - [`RpcDriver`]: the I/O future. It owns the transport and the session
//!   keys, writes queued requests, correlates responses by id, and
//!   forwards notifications. It resolves when the transport closes (`Ok`)
//!   or fails (`Err`).
//!
//! Nothing is spawned here. The caller polls the driver alongside its own
//! work, typically in one `tokio::select!` loop.
//!
//! # Message flow
//!
//! 1. A client method allocates an id and queues the request.
//! 2. The driver seals and writes it, registering a reply slot if the
//!    caller is waiting.
//! 3. Inbound frames are opened and parsed. A response resolves its slot;
//!    a notification goes to the receiver.
//! 4. When the driver exits, every outstanding slot is dropped, so waiting
//!    callers see [`Error::Closed`].

pub mod types;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::handshake::SessionKeys;
use crate::transport::Transport;

pub use types::{Notification, OutputKind, OutputMap, OutputRecord, OutputState, method};
use types::{Incoming, IncomingFrame, JSONRPC_VERSION, RequestFrame, parse_notification};

/// Receiver for decoded server notifications. One per session.
pub type Notifications = mpsc::UnboundedReceiver<Notification>;

type ReplySlot = oneshot::Sender<Result<Value, Error>>;

struct Outbound {
    id: u64,
    method: &'static str,
    params: Option<Value>,
    reply: Option<ReplySlot>,
}

/// Split an authenticated transport into client, notifications, and driver.
pub fn session<T: Transport, K: SessionKeys>(
    transport: T,
    keys: K,
) -> (RpcClient, Notifications, RpcDriver<T, K>) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();

    let client = RpcClient {
        outbound: outbound_tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    let driver = RpcDriver {
        transport,
        keys,
        outbound: outbound_rx,
        notifications: notify_tx,
        pending: HashMap::new(),
    };

    (client, notify_rx, driver)
}

// ── RpcClient ────────────────────────────────────────────────────────

/// Request handle for one RPC session.
#[derive(Debug, Clone)]
pub struct RpcClient {
    outbound: mpsc::UnboundedSender<Outbound>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    /// Fetch the complete output snapshot.
    pub async fn fetch_outputs(&self) -> Result<OutputMap, Error> {
        let value = self.call(method::OUTPUTS_GET, None)?.await?;
        let body = value.to_string();
        serde_json::from_value(value).map_err(|e| Error::deserialization(&e, body.as_bytes()))
    }

    /// Ask the server to start an output. Returns once queued.
    pub fn start_output(&self, id: &str) -> Result<(), Error> {
        self.send(method::OUTPUTS_START, Some(json!({ "id": id })))
    }

    /// Ask the server to stop an output. Returns once queued.
    pub fn stop_output(&self, id: &str) -> Result<(), Error> {
        self.send(method::OUTPUTS_STOP, Some(json!({ "id": id })))
    }

    /// Change an output's delay and wait for the server's verdict.
    pub async fn set_output_delay(&self, id: &str, seconds: u32) -> Result<(), Error> {
        self.call(
            method::OUTPUTS_SET_DELAY,
            Some(json!({ "id": id, "seconds": seconds })),
        )?
        .await
        .map(drop)
    }

    /// Queue a request whose response the caller will await.
    pub fn call(&self, method: &'static str, params: Option<Value>) -> Result<PendingReply, Error> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(method, params, Some(tx))?;
        Ok(PendingReply { rx })
    }

    /// Queue a request and ignore its response.
    pub fn send(&self, method: &'static str, params: Option<Value>) -> Result<(), Error> {
        self.enqueue(method, params, None)
    }

    /// `true` once the driver has exited.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    fn enqueue(
        &self,
        method: &'static str,
        params: Option<Value>,
        reply: Option<ReplySlot>,
    ) -> Result<(), Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.outbound
            .send(Outbound {
                id,
                method,
                params,
                reply,
            })
            .map_err(|_| Error::Closed)
    }
}

/// Future resolving to the result of one request.
///
/// Resolves to [`Error::Closed`] if the session ends first.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Value, Error>>,
}

impl Future for PendingReply {
    type Output = Result<Value, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(Error::Closed)))
    }
}

// ── RpcDriver ────────────────────────────────────────────────────────

/// Owns the transport and pumps frames in both directions.
pub struct RpcDriver<T, K> {
    transport: T,
    keys: K,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    notifications: mpsc::UnboundedSender<Notification>,
    pending: HashMap<u64, ReplySlot>,
}

impl<T: Transport, K: SessionKeys> RpcDriver<T, K> {
    /// Run until the transport closes or fails.
    pub async fn run(mut self) -> Result<(), Error> {
        loop {
            tokio::select! {
                biased;
                frame = self.transport.next() => match frame {
                    Some(Ok(frame)) => self.handle_frame(&frame)?,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "RPC transport error");
                        return Err(e);
                    }
                    None => {
                        tracing::info!(
                            pending = self.pending.len(),
                            "RPC transport closed"
                        );
                        return Ok(());
                    }
                },
                request = self.outbound.recv() => {
                    // Every client handle is gone; nobody can observe us.
                    let Some(request) = request else { return Ok(()) };
                    self.write_request(request).await?;
                }
            }
        }
    }

    async fn write_request(&mut self, request: Outbound) -> Result<(), Error> {
        let frame = RequestFrame {
            jsonrpc: JSONRPC_VERSION,
            id: request.id,
            method: request.method,
            params: request.params.as_ref(),
        };
        let plaintext = serde_json::to_vec(&frame)
            .map_err(|e| Error::Protocol(format!("failed to encode request: {e}")))?;
        let sealed = self.keys.seal(&plaintext)?;

        if let Some(reply) = request.reply {
            self.pending.insert(request.id, reply);
        }

        tracing::debug!(id = request.id, method = request.method, "Sending RPC request");
        self.transport.send(sealed).await
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        let plaintext = self.keys.open(frame)?;

        let incoming: IncomingFrame = match serde_json::from_slice(&plaintext) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse RPC message");
                return Ok(());
            }
        };

        match incoming.classify() {
            Ok(Incoming::Response { id, outcome }) => self.resolve(id, outcome),
            Ok(Incoming::Notification { method, params }) => self.dispatch(&method, params),
            Err(e) => tracing::debug!(error = %e, "Ignoring malformed RPC message"),
        }
        Ok(())
    }

    fn resolve(&mut self, id: u64, outcome: Result<Value, Error>) {
        if let Some(slot) = self.pending.remove(&id) {
            // The waiter may have been abandoned; that is fine.
            let _ = slot.send(outcome);
            return;
        }
        match outcome {
            Ok(_) => tracing::trace!(id, "Request acknowledged"),
            Err(e) => tracing::warn!(id, error = %e, "Request rejected by server"),
        }
    }

    fn dispatch(&self, method: &str, params: Value) {
        match parse_notification(method, params) {
            Ok(Some(notification)) => {
                // Receiver dropped means the session is shutting down.
                let _ = self.notifications.send(notification);
            }
            Ok(None) => tracing::debug!(method, "Ignoring unknown notification"),
            Err(e) => tracing::warn!(method, error = %e, "Dropping undecodable notification"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
