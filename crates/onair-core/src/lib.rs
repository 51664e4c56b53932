// onair-core: Session supervision and live output state between onair-api and consumers.

pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod remote;
pub mod session;
pub mod store;
pub mod stream;
pub mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::OutputCommand;
pub use config::ConnectionConfig;
pub use error::CoreError;
pub use model::{Output, OutputId, OutputKind, OutputState};
pub use remote::Remote;
pub use session::SessionClient;
pub use store::{OutputRegistry, RegistryChange, Snapshot};
pub use stream::OutputStream;
pub use supervisor::{ConnectionState, ConnectionSupervisor, RECONNECT_DELAY};
