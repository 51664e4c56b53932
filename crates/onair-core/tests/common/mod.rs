// Shared fixtures: an in-memory connector, a password handshake, and a
// scripted server end.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout};

use onair_api::{
    Connector, Endpoint, Error, Handshake, MemoryTransport, SessionKeys, Transport, duplex,
};
use onair_core::{ConnectionConfig, ConnectionState, OutputRegistry, Snapshot};

/// Upper bound for any single wait. Virtual under a paused clock.
pub const WAIT: Duration = Duration::from_secs(30);

pub const PASSWORD: &str = "hunter2";

/// Route library logs to the test harness. `RUST_LOG=onair_core=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> ConnectionConfig {
    ConnectionConfig::new("studio.local", 4455, SecretString::from(PASSWORD.to_owned())).unwrap()
}

// ── Keys / handshake ────────────────────────────────────────────────

pub struct PlainKeys;

impl SessionKeys for PlainKeys {
    fn seal(&mut self, plaintext: &[u8]) -> Result<Bytes, Error> {
        Ok(Bytes::copy_from_slice(plaintext))
    }

    fn open(&mut self, frame: &[u8]) -> Result<Bytes, Error> {
        Ok(Bytes::copy_from_slice(frame))
    }
}

/// Sends `auth:<password>` and expects `ok` back.
pub struct PasswordHandshake;

impl Handshake for PasswordHandshake {
    type Keys = PlainKeys;

    async fn perform<T: Transport>(
        &self,
        transport: &mut T,
        password: &SecretString,
    ) -> Result<PlainKeys, Error> {
        let greeting = format!("auth:{}", password.expose_secret());
        transport.send(Bytes::from(greeting)).await?;
        match transport.next().await {
            Some(Ok(reply)) if reply.as_ref() == b"ok" => Ok(PlainKeys),
            Some(Ok(_)) => Err(Error::Handshake {
                message: "password rejected".into(),
            }),
            Some(Err(e)) => Err(e),
            None => Err(Error::Closed),
        }
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Hands the client end of a fresh pipe to the supervisor and the server
/// end to the test.
#[derive(Clone)]
pub struct MockConnector {
    servers: mpsc::UnboundedSender<MockServer>,
    refusals: Arc<AtomicU32>,
    failure: Arc<Mutex<Option<Error>>>,
    attempts: Arc<Mutex<Vec<(Instant, Endpoint)>>>,
}

pub struct Accepted(mpsc::UnboundedReceiver<MockServer>);

impl MockConnector {
    pub fn new() -> (Self, Accepted) {
        init_tracing();
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            servers,
            refusals: Arc::new(AtomicU32::new(0)),
            failure: Arc::new(Mutex::new(None)),
            attempts: Arc::new(Mutex::new(Vec::new())),
        };
        (connector, Accepted(rx))
    }

    /// Fail the next `n` connects with a connect error.
    pub fn refuse_next(&self, n: u32) {
        self.refusals.store(n, Ordering::SeqCst);
    }

    /// Fail the next connect with `err`.
    pub fn fail_next_with(&self, err: Error) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn attempt_endpoints(&self) -> Vec<Endpoint> {
        self.attempts.lock().unwrap().iter().map(|(_, ep)| ep.clone()).collect()
    }
}

impl Connector for MockConnector {
    type Transport = MemoryTransport;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MemoryTransport, Error> {
        self.attempts.lock().unwrap().push((Instant::now(), endpoint.clone()));

        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".into(),
            });
        }

        let (client, server) = duplex();
        self.servers
            .send(MockServer { transport: server })
            .map_err(|_| Error::Closed)?;
        Ok(client)
    }
}

impl Accepted {
    /// The server end of the next successful connect.
    pub async fn next(&mut self) -> MockServer {
        timeout(WAIT, self.0.recv())
            .await
            .expect("no connection within timeout")
            .unwrap()
    }
}

// ── Server end ──────────────────────────────────────────────────────

pub struct MockServer {
    transport: MemoryTransport,
}

impl MockServer {
    /// Accept the handshake and return the password the client sent.
    pub async fn accept_handshake(&mut self) -> String {
        let password = self.read_greeting().await;
        self.transport.send(Bytes::from_static(b"ok")).await.unwrap();
        password
    }

    /// Refuse the handshake and return the password the client sent.
    pub async fn deny_handshake(&mut self) -> String {
        let password = self.read_greeting().await;
        self.transport.send(Bytes::from_static(b"denied")).await.unwrap();
        password
    }

    async fn read_greeting(&mut self) -> String {
        let frame = self.recv_frame().await;
        let text = String::from_utf8(frame.to_vec()).unwrap();
        text.strip_prefix("auth:").expect("not a greeting").to_owned()
    }

    async fn recv_frame(&mut self) -> Bytes {
        timeout(WAIT, self.transport.next())
            .await
            .expect("no frame within timeout")
            .expect("client closed the transport")
            .unwrap()
    }

    pub async fn recv_json(&mut self) -> Value {
        serde_json::from_slice(&self.recv_frame().await).unwrap()
    }

    pub async fn send_json(&mut self, value: Value) {
        self.transport.send(Bytes::from(value.to_string())).await.unwrap();
    }

    pub async fn notify_state(&mut self, id: &str, state: &str) {
        self.send_json(json!({
            "jsonrpc": "2.0",
            "method": "outputs/stateChanged",
            "params": { "id": id, "state": state }
        }))
        .await;
    }

    /// Send `hello` and answer the snapshot request with `outputs`.
    pub async fn serve_hello(&mut self, outputs: Value) {
        self.send_json(json!({ "jsonrpc": "2.0", "method": "hello", "params": {} }))
            .await;
        let request = self.recv_json().await;
        assert_eq!(request["method"], "outputs/get");
        self.send_json(json!({ "jsonrpc": "2.0", "id": request["id"], "result": outputs }))
            .await;
    }

    /// Assert the client sends nothing for `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(frame) = timeout(window, self.transport.next()).await {
            panic!("unexpected frame from client: {frame:?}");
        }
    }

    /// `true` once the client has closed its end.
    pub async fn is_closed_by_client(&mut self) -> bool {
        matches!(timeout(WAIT, self.transport.next()).await, Ok(None))
    }
}

pub fn two_outputs() -> Value {
    json!({
        "rec": { "id": "rec", "name": "Recording", "type": "local_recording", "state": "stopped" },
        "r1": { "id": "r1", "name": "Twitch", "type": "streaming", "state": "active" }
    })
}

// ── Waiting ─────────────────────────────────────────────────────────

pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    wanted: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    timeout(WAIT, rx.wait_for(|state| wanted(state)))
        .await
        .expect("state not reached within timeout")
        .unwrap()
        .clone()
}

pub async fn wait_for_outputs(registry: &OutputRegistry, wanted: impl Fn(&Snapshot) -> bool) {
    let mut stream = registry.subscribe();
    timeout(WAIT, async {
        while !wanted(stream.latest().as_ref()) {
            stream.changed().await.unwrap();
        }
    })
    .await
    .expect("registry condition not reached within timeout");
}
