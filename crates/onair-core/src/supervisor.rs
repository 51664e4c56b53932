// ── Connection supervisor ──
//
// Owns the connect → handshake → session lifecycle and keeps it alive:
// every lost transport or failed attempt is followed by a fixed delay and
// a fresh attempt with the same config. Only a refused handshake, a
// connect error no retry can cure, or cancellation ends the loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use onair_api::{Connector, Endpoint, Handshake};

use crate::config::ConnectionConfig;
use crate::error::CoreError;
use crate::session::SessionClient;
use crate::store::OutputRegistry;

/// Pause between the end of one attempt and the start of the next.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(500);

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out [`RECONNECT_DELAY`] before attempt number `attempt`.
    Reconnecting { attempt: u32 },
    /// The handshake was refused or the endpoint is unusable; the
    /// supervisor has stopped.
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// How one connection attempt ended.
enum AttemptOutcome {
    /// The server refused the handshake, or connecting failed in a way a
    /// retry cannot fix.
    Fatal(CoreError),
    /// Connecting, the handshake, or the session failed transiently.
    Lost(CoreError),
    /// The session ran and the transport closed normally.
    Closed,
}

// ── ConnectionSupervisor ─────────────────────────────────────────

/// Keeps one logical connection alive across transport failures.
///
/// The registry outlives individual sessions: it is cleared when a session
/// ends and refilled by the next one, so subscribers never need to
/// resubscribe.
pub struct ConnectionSupervisor<C, H> {
    connector: C,
    handshake: H,
    registry: OutputRegistry,
    state: watch::Sender<ConnectionState>,
    session: watch::Sender<Option<SessionClient>>,
}

impl<C: Connector, H: Handshake> ConnectionSupervisor<C, H> {
    pub fn new(connector: C, handshake: H) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (session, _) = watch::channel(None);
        Self {
            connector,
            handshake,
            registry: OutputRegistry::new(),
            state,
            session,
        }
    }

    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    /// Subscribe to connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The live session, if one is established.
    pub fn current_session(&self) -> Option<SessionClient> {
        self.session.borrow().clone()
    }

    /// Subscribe to session changes. `None` between sessions.
    pub fn sessions(&self) -> watch::Receiver<Option<SessionClient>> {
        self.session.subscribe()
    }

    /// Run the reconnect loop until `cancel` fires, the handshake is
    /// refused, or connecting fails with a non-transient error.
    ///
    /// Returns `Ok(())` on cancellation and the terminal error otherwise.
    /// Every other failure is logged and retried after
    /// [`RECONNECT_DELAY`].
    pub async fn run(&self, config: &ConnectionConfig, cancel: CancellationToken) -> Result<(), CoreError> {
        let endpoint = config.endpoint();
        let mut attempt: u32 = 0;
        self.state.send_replace(ConnectionState::Connecting);

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.attempt(config, &endpoint) => outcome,
            };
            self.teardown();

            match outcome {
                AttemptOutcome::Fatal(err) => {
                    error!(endpoint = %endpoint, error = %err, "giving up on connection");
                    self.state.send_replace(ConnectionState::Failed {
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
                AttemptOutcome::Lost(err) => {
                    warn!(endpoint = %endpoint, error = %err, "connection lost");
                }
                AttemptOutcome::Closed => {
                    info!(endpoint = %endpoint, "session closed by server");
                }
            }

            attempt = attempt.saturating_add(1);
            self.state.send_replace(ConnectionState::Reconnecting { attempt });
            debug!(attempt, delay = ?RECONNECT_DELAY, "waiting before reconnect");

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }

        self.teardown();
        self.state.send_replace(ConnectionState::Disconnected);
        debug!(endpoint = %endpoint, "supervisor stopped");
        Ok(())
    }

    async fn attempt(&self, config: &ConnectionConfig, endpoint: &Endpoint) -> AttemptOutcome {
        debug!(endpoint = %endpoint, "connecting");
        let mut transport = match self.connector.connect(endpoint).await {
            Ok(transport) => transport,
            Err(e) if e.is_transient() => return AttemptOutcome::Lost(e.into()),
            Err(e) => return AttemptOutcome::Fatal(e.into()),
        };

        let keys = match self.handshake.perform(&mut transport, config.password()).await {
            Ok(keys) => keys,
            Err(e) if e.is_handshake_rejection() => return AttemptOutcome::Fatal(e.into()),
            Err(e) => return AttemptOutcome::Lost(e.into()),
        };

        let (rpc, notifications, driver) = onair_api::session(transport, keys);
        let session = SessionClient::new(rpc, self.registry.clone());
        self.session.send_replace(Some(session.clone()));
        self.state.send_replace(ConnectionState::Connected);
        info!(endpoint = %endpoint, "connected");

        match session.run(driver, notifications).await {
            Ok(()) => AttemptOutcome::Closed,
            Err(e) => AttemptOutcome::Lost(e),
        }
    }

    /// Forget the ended session and everything it reported.
    fn teardown(&self) {
        self.session.send_replace(None);
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_is_half_a_second() {
        assert_eq!(RECONNECT_DELAY, Duration::from_millis(500));
    }

    #[test]
    fn only_connected_counts_as_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting { attempt: 1 }.is_connected());
        assert!(!ConnectionState::Failed { reason: "x".into() }.is_connected());
    }
}
