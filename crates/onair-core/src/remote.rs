// ── Remote facade ──
//
// Single entry point for applications: owns one supervisor, runs it on a
// background task, and routes commands to whichever session is live.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use onair_api::{Connector, Handshake};

use crate::command::OutputCommand;
use crate::config::ConnectionConfig;
use crate::error::CoreError;
use crate::model::Output;
use crate::session::SessionClient;
use crate::store::{OutputRegistry, RegistryChange, Snapshot};
use crate::stream::OutputStream;
use crate::supervisor::{ConnectionState, ConnectionSupervisor};

/// Handle to a supervised connection.
///
/// Cheaply cloneable via `Arc`. Created idle; [`connect`](Self::connect)
/// starts the reconnect loop in the background.
pub struct Remote<C, H> {
    inner: Arc<RemoteInner<C, H>>,
}

impl<C, H> Clone for Remote<C, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct RemoteInner<C, H> {
    supervisor: Arc<ConnectionSupervisor<C, H>>,
    run: Mutex<Option<SupervisorRun>>,
}

/// Outcome of a finished run. `None` while the supervisor is running.
type RunOutcome = Option<Result<(), CoreError>>;

struct SupervisorRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    outcome: watch::Receiver<RunOutcome>,
}

impl<C: Connector, H: Handshake> Remote<C, H> {
    pub fn new(connector: C, handshake: H) -> Self {
        Self {
            inner: Arc::new(RemoteInner {
                supervisor: Arc::new(ConnectionSupervisor::new(connector, handshake)),
                run: Mutex::new(None),
            }),
        }
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start supervising a connection to `config`.
    ///
    /// Any previous run is cancelled and awaited first, so at most one
    /// session exists at a time. Returns as soon as the new run is spawned;
    /// watch [`connection_state`](Self::connection_state) for progress.
    pub async fn connect(&self, config: ConnectionConfig) {
        let mut run = self.inner.run.lock().await;
        if let Some(previous) = run.take() {
            debug!("replacing running supervisor");
            stop(previous).await;
        }

        let cancel = CancellationToken::new();
        let supervisor = Arc::clone(&self.inner.supervisor);
        let task_cancel = cancel.clone();
        let (done, outcome) = watch::channel(None);
        info!(host = config.host(), port = config.port(), "starting connection supervisor");
        let handle = tokio::spawn(async move {
            let result = supervisor.run(&config, task_cancel).await;
            done.send_replace(Some(result));
        });

        *run = Some(SupervisorRun {
            cancel,
            handle,
            outcome,
        });
    }

    /// Stop the supervisor and wait for it to wind down.
    pub async fn disconnect(&self) {
        if let Some(previous) = self.inner.run.lock().await.take() {
            stop(previous).await;
            debug!("disconnected");
        }
    }

    /// Wait for the current run to end on its own.
    ///
    /// Resolves with the terminal error if the handshake is refused or the
    /// endpoint is unusable, or `Ok(())` if the run was cancelled. Any
    /// number of callers may wait at once; each sees the same outcome.
    /// Returns immediately when nothing is running.
    pub async fn join(&self) -> Result<(), CoreError> {
        let mut outcome = match self.inner.run.lock().await.as_ref() {
            Some(run) => run.outcome.clone(),
            None => return Ok(()),
        };
        match outcome.wait_for(Option::is_some).await {
            Ok(finished) => finished.clone().unwrap_or(Ok(())),
            Err(_) => Err(CoreError::Internal("supervisor task failed".into())),
        }
    }

    /// Subscribe to connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.connection_state()
    }

    // ── Output reads ─────────────────────────────────────────────

    pub fn registry(&self) -> &OutputRegistry {
        self.inner.supervisor.registry()
    }

    pub fn outputs_snapshot(&self) -> Arc<Snapshot> {
        self.registry().snapshot()
    }

    pub fn output(&self, id: &str) -> Option<Output> {
        self.registry().get(id)
    }

    pub fn outputs(&self) -> OutputStream {
        self.registry().subscribe()
    }

    pub fn changes(&self) -> broadcast::Receiver<RegistryChange> {
        self.registry().changes()
    }

    // ── Commands ─────────────────────────────────────────────────

    pub fn start_output(&self, id: &str) -> Result<(), CoreError> {
        self.session()?.start_output(id)
    }

    pub fn stop_output(&self, id: &str) -> Result<(), CoreError> {
        self.session()?.stop_output(id)
    }

    /// See [`SessionClient::toggle`].
    pub fn toggle(&self, id: &str) -> Result<Option<OutputCommand>, CoreError> {
        self.session()?.toggle(id)
    }

    pub async fn set_delay(&self, id: &str, seconds: u32) -> Result<(), CoreError> {
        self.session()?.set_delay(id, seconds).await
    }

    fn session(&self) -> Result<SessionClient, CoreError> {
        self.inner
            .supervisor
            .current_session()
            .ok_or(CoreError::Disconnected)
    }
}

/// Cancel a run and wait until its task has finished.
async fn stop(run: SupervisorRun) {
    run.cancel.cancel();
    if let Err(e) = run.handle.await {
        warn!(error = %e, "supervisor task failed");
        return;
    }
    if let Some(Err(e)) = &*run.outcome.borrow() {
        debug!(error = %e, "supervisor had already stopped");
    }
}
