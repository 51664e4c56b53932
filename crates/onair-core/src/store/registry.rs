// ── Output registry ──
//
// Holds the most recent full snapshot of outputs, patched in place by
// state-change notifications. Readers get cheap `Arc` snapshots and can
// subscribe to either whole snapshots (`watch`) or individual changes
// (`broadcast`).

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use crate::model::{Output, OutputId, OutputState};
use crate::stream::OutputStream;

const CHANGE_CHANNEL_SIZE: usize = 256;

/// Outputs keyed by id, in server order.
pub type Snapshot = IndexMap<OutputId, Output>;

/// One mutation applied to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    /// A full snapshot replaced the previous contents.
    Replaced { count: usize },
    /// A single output moved to a new state.
    StateChanged {
        id: OutputId,
        previous: OutputState,
        state: OutputState,
    },
    /// The session ended and every output was dropped.
    Cleared,
}

/// Shared, cheaply cloneable handle to the output table.
///
/// Each mutation publishes a new `Arc<Snapshot>`; readers holding an
/// older snapshot keep seeing a consistent view.
#[derive(Clone)]
pub struct OutputRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    snapshot: watch::Sender<Arc<Snapshot>>,
    changes: broadcast::Sender<RegistryChange>,
}

impl Default for OutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutputRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRegistry")
            .field("outputs", &self.len())
            .finish()
    }
}

impl OutputRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Snapshot::new()));
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            inner: Arc::new(RegistryInner { snapshot, changes }),
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace the whole table with a fresh snapshot.
    pub fn replace_all(&self, outputs: Snapshot) {
        let count = outputs.len();
        // `send_replace` updates unconditionally, even with zero receivers.
        self.inner.snapshot.send_replace(Arc::new(outputs));
        self.notify(RegistryChange::Replaced { count });
        debug!(count, "output snapshot replaced");
    }

    /// Set the state of a known output.
    ///
    /// Returns `false` if `id` is not in the table; nothing changes then.
    /// A patch to the state the output already has is accepted silently.
    pub fn patch_state(&self, id: &str, state: OutputState) -> bool {
        let mut known = false;
        let mut previous = None;

        self.inner.snapshot.send_if_modified(|snapshot| {
            let Some(current) = snapshot.get(id) else {
                return false;
            };
            known = true;
            if current.state == state {
                return false;
            }
            previous = Some(current.state);
            // Copy-on-write: readers holding the old Arc keep their view.
            if let Some(output) = Arc::make_mut(snapshot).get_mut(id) {
                output.state = state;
            }
            true
        });

        if let Some(previous) = previous {
            trace!(id, %previous, %state, "output state patched");
            self.notify(RegistryChange::StateChanged {
                id: OutputId::from(id),
                previous,
                state,
            });
        }
        known
    }

    /// Drop every output.
    pub fn clear(&self) {
        let had_outputs = self.inner.snapshot.send_if_modified(|snapshot| {
            if snapshot.is_empty() {
                return false;
            }
            *snapshot = Arc::new(Snapshot::new());
            true
        });
        if had_outputs {
            self.notify(RegistryChange::Cleared);
            debug!("output registry cleared");
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<Output> {
        self.inner.snapshot.borrow().get(id).cloned()
    }

    pub fn state_of(&self, id: &str) -> Option<OutputState> {
        self.inner.snapshot.borrow().get(id).map(|output| output.state)
    }

    pub fn len(&self) -> usize {
        self.inner.snapshot.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.snapshot.borrow().is_empty()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe to whole-snapshot updates.
    pub fn subscribe(&self) -> OutputStream {
        OutputStream::new(self.inner.snapshot.subscribe())
    }

    /// Subscribe to individual mutations.
    ///
    /// Slow receivers lag rather than block writers; see
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn changes(&self) -> broadcast::Receiver<RegistryChange> {
        self.inner.changes.subscribe()
    }

    fn notify(&self, change: RegistryChange) {
        // No subscribers is fine.
        let _ = self.inner.changes.send(change);
    }
}
