// ── Session client ──
//
// Binds one authenticated RPC session to the output registry: reacts to
// `hello` by fetching a full snapshot, applies state-change notifications
// in arrival order, and issues output commands.

use std::future::Future;
use std::pin::Pin;

use futures_util::future::OptionFuture;
use tracing::{debug, info, warn};

use onair_api::{Notification, Notifications, RpcClient, RpcDriver, SessionKeys, Transport};

use crate::command::OutputCommand;
use crate::convert::snapshot_from_wire;
use crate::error::CoreError;
use crate::model::OutputState;
use crate::store::OutputRegistry;

type ReadyFuture = Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send>>;

/// Handle to the current session.
///
/// Cheap to clone. Command methods fail with [`CoreError::Disconnected`]
/// once the session's transport is gone.
#[derive(Clone, Debug)]
pub struct SessionClient {
    rpc: RpcClient,
    registry: OutputRegistry,
}

impl SessionClient {
    pub fn new(rpc: RpcClient, registry: OutputRegistry) -> Self {
        Self { rpc, registry }
    }

    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    /// `false` once the session driver has stopped.
    pub fn is_open(&self) -> bool {
        !self.rpc.is_closed()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Ask the server to start an output. Does not wait for a reply; the
    /// outcome arrives as state-change notifications.
    pub fn start_output(&self, id: &str) -> Result<(), CoreError> {
        debug!(id, "requesting output start");
        self.rpc.start_output(id).map_err(CoreError::from)
    }

    /// Ask the server to stop an output. Fire-and-forget, like
    /// [`start_output`](Self::start_output).
    pub fn stop_output(&self, id: &str) -> Result<(), CoreError> {
        debug!(id, "requesting output stop");
        self.rpc.stop_output(id).map_err(CoreError::from)
    }

    /// Start a stopped output or stop an active one.
    ///
    /// Returns the command sent, or `None` when the output is mid-transition
    /// and the toggle was ignored. An id missing from the registry is an
    /// error and sends nothing.
    pub fn toggle(&self, id: &str) -> Result<Option<OutputCommand>, CoreError> {
        let state = self
            .registry
            .state_of(id)
            .ok_or_else(|| CoreError::OutputNotFound { id: id.to_owned() })?;

        let Some(command) = OutputCommand::for_toggle(state) else {
            debug!(id, %state, "output is transitioning, toggle ignored");
            return Ok(None);
        };

        match command {
            OutputCommand::Start => self.start_output(id)?,
            OutputCommand::Stop => self.stop_output(id)?,
        }
        Ok(Some(command))
    }

    /// Change an output's broadcast delay and wait for the server to
    /// accept it.
    pub async fn set_delay(&self, id: &str, seconds: u32) -> Result<(), CoreError> {
        debug!(id, seconds, "setting output delay");
        self.rpc
            .set_output_delay(id, seconds)
            .await
            .map_err(CoreError::from)
    }

    // ── Notification handlers ────────────────────────────────────────

    /// Start the one-shot snapshot fetch that follows `hello`.
    pub fn on_ready(&self) -> impl Future<Output = Result<(), CoreError>> + Send + use<> {
        let rpc = self.rpc.clone();
        let registry = self.registry.clone();
        async move {
            let outputs = rpc.fetch_outputs().await.map_err(|e| {
                warn!(error = %e, "output snapshot fetch failed");
                CoreError::from(e)
            })?;
            let snapshot = snapshot_from_wire(outputs);
            info!(outputs = snapshot.len(), "output snapshot received");
            registry.replace_all(snapshot);
            Ok(())
        }
    }

    /// Apply a state-change notification. Unknown ids are logged and
    /// dropped.
    pub fn on_state_changed(&self, id: &str, state: OutputState) {
        if !self.registry.patch_state(id, state) {
            warn!(id, %state, "state change for unknown output ignored");
        }
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Drive the session until the transport ends.
    ///
    /// Polls the RPC driver, the notification queue, and at most one
    /// in-flight snapshot fetch. A completed fetch is installed before any
    /// notification queued after its reply, so the registry never moves
    /// backwards. A failed fetch ends the session.
    pub async fn run<T, K>(&self, driver: RpcDriver<T, K>, mut notifications: Notifications) -> Result<(), CoreError>
    where
        T: Transport,
        K: SessionKeys,
    {
        let driver = driver.run();
        tokio::pin!(driver);

        let mut ready: Option<ReadyFuture> = None;
        let mut notifications_open = true;

        loop {
            tokio::select! {
                biased;

                Some(result) = OptionFuture::from(ready.as_mut()), if ready.is_some() => {
                    ready = None;
                    result?;
                }

                notification = notifications.recv(), if notifications_open => match notification {
                    Some(Notification::Hello) => {
                        if ready.is_some() {
                            debug!("hello received again, restarting snapshot fetch");
                        }
                        ready = Some(Box::pin(self.on_ready()));
                    }
                    Some(Notification::OutputStateChanged { id, state }) => {
                        self.on_state_changed(&id, state.into());
                    }
                    None => notifications_open = false,
                },

                result = &mut driver => {
                    return result.map_err(CoreError::from);
                }
            }
        }
    }
}
