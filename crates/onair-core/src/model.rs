// ── Domain model ──
//
// Outputs as the rest of the application sees them. Wire records from
// onair-api are converted in `convert.rs`.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Server-assigned output identifier. Stable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputId(String);

impl OutputId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OutputId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OutputId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// Lets registry maps be queried with a plain `&str`.
impl Borrow<str> for OutputId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// What an output writes to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputKind {
    LocalRecording,
    Streaming,
}

/// Lifecycle of an output. `Starting` and `Stopping` are transitional.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputState {
    Stopped,
    Starting,
    Active,
    Stopping,
}

impl OutputState {
    /// `true` while the server is moving the output between stable states.
    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }

    pub fn is_live(self) -> bool {
        self == Self::Active
    }

    /// Short human label for status displays.
    pub fn label(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Active => "LIVE",
            Self::Stopping => "Stopping",
        }
    }
}

/// One output known to the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: OutputId,
    pub name: String,
    pub kind: OutputKind,
    pub state: OutputState,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn labels() {
        assert_eq!(OutputState::Active.label(), "LIVE");
        assert_eq!(OutputState::Stopped.label(), "Stopped");
        assert_eq!(OutputState::Starting.label(), "Starting");
        assert_eq!(OutputState::Stopping.label(), "Stopping");
    }

    #[test]
    fn transitional_states() {
        assert!(OutputState::Starting.is_transitioning());
        assert!(OutputState::Stopping.is_transitioning());
        assert!(!OutputState::Active.is_transitioning());
        assert!(!OutputState::Stopped.is_transitioning());
        assert!(OutputState::Active.is_live());
    }

    #[test]
    fn kind_parses_wire_names() {
        assert_eq!(OutputKind::from_str("local_recording").unwrap(), OutputKind::LocalRecording);
        assert_eq!(OutputKind::Streaming.to_string(), "streaming");
    }

    #[test]
    fn output_id_serializes_transparently() {
        let id = OutputId::from("r1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"r1\"");
        assert_eq!(id.to_string(), "r1");
    }
}
