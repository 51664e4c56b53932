// ── Reactive output store ──
//
// Snapshot storage for the outputs of the current session, with
// push-based change notification.

mod registry;

pub use registry::{OutputRegistry, RegistryChange, Snapshot};
