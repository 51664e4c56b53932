// ── API-to-domain type conversions ──
//
// Bridges `onair_api` wire records into `onair_core::model` types.

use onair_api::{OutputMap, OutputRecord};
use tracing::debug;

use crate::model::{Output, OutputId, OutputKind, OutputState};
use crate::store::Snapshot;

impl From<onair_api::OutputState> for OutputState {
    fn from(state: onair_api::OutputState) -> Self {
        match state {
            onair_api::OutputState::Stopped => Self::Stopped,
            onair_api::OutputState::Starting => Self::Starting,
            onair_api::OutputState::Active => Self::Active,
            onair_api::OutputState::Stopping => Self::Stopping,
        }
    }
}

impl From<onair_api::OutputKind> for OutputKind {
    fn from(kind: onair_api::OutputKind) -> Self {
        match kind {
            onair_api::OutputKind::LocalRecording => Self::LocalRecording,
            onair_api::OutputKind::Streaming => Self::Streaming,
        }
    }
}

impl From<OutputRecord> for Output {
    fn from(record: OutputRecord) -> Self {
        Self {
            id: OutputId::from(record.id),
            name: record.name,
            kind: record.kind.into(),
            state: record.state.into(),
        }
    }
}

/// Build a registry snapshot from an `outputs/get` result.
///
/// The map key is authoritative: a record whose embedded `id` disagrees
/// is stored under its key.
pub(crate) fn snapshot_from_wire(outputs: OutputMap) -> Snapshot {
    outputs
        .into_iter()
        .map(|(key, record)| {
            let mut output = Output::from(record);
            if output.id.as_str() != key {
                debug!(key = %key, embedded = %output.id, "output id differs from map key");
                output.id = OutputId::from(key);
            }
            (output.id.clone(), output)
        })
        .collect()
}
