// ── Reactive output stream ──
//
// Subscription type for consuming snapshot changes from the registry.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::Snapshot;

/// A subscription to the output table.
///
/// Gives point-in-time access via [`current`](Self::current) and
/// [`latest`](Self::latest), and change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`.
pub struct OutputStream {
    current: Arc<Snapshot>,
    receiver: watch::Receiver<Arc<Snapshot>>,
}

impl OutputStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Snapshot>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    /// The newest snapshot, which may be ahead of `current()`.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change and return the new snapshot.
    /// Returns `None` once the registry has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.changed().await.ok()?;
        let snapshot = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snapshot);
        Some(snapshot)
    }

    /// Convert into a `Stream`. The first item is the current snapshot.
    pub fn into_stream(self) -> OutputWatchStream {
        OutputWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by the registry's `watch` channel.
pub struct OutputWatchStream {
    inner: WatchStream<Arc<Snapshot>>,
}

impl Stream for OutputWatchStream {
    type Item = Arc<Snapshot>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Output, OutputId, OutputKind, OutputState};
    use crate::store::OutputRegistry;
    use futures_util::StreamExt;

    fn one(state: OutputState) -> Snapshot {
        let id = OutputId::from("rec");
        let output = Output {
            id: id.clone(),
            name: "Recording".into(),
            kind: OutputKind::LocalRecording,
            state,
        };
        [(id, output)].into_iter().collect()
    }

    #[test]
    fn latest_runs_ahead_of_current() {
        let registry = OutputRegistry::new();
        let stream = registry.subscribe();

        registry.replace_all(one(OutputState::Stopped));

        assert!(stream.current().is_empty());
        assert_eq!(stream.latest().len(), 1);
    }

    #[tokio::test]
    async fn changed_returns_none_when_registry_dropped() {
        let registry = OutputRegistry::new();
        let mut stream = registry.subscribe();
        drop(registry);

        assert!(stream.changed().await.is_none());
    }

    #[tokio::test]
    async fn into_stream_yields_current_then_updates() {
        let registry = OutputRegistry::new();
        registry.replace_all(one(OutputState::Stopped));
        let mut stream = registry.subscribe().into_stream();

        let first = stream.next().await.unwrap();
        assert_eq!(first["rec"].state, OutputState::Stopped);

        registry.patch_state("rec", OutputState::Starting);
        let second = stream.next().await.unwrap();
        assert_eq!(second["rec"].state, OutputState::Starting);
    }
}
