// ── Output commands ──
//
// The two lifecycle commands a client can issue, and the toggle rule
// that picks between them.

use strum::{Display, IntoStaticStr};

use crate::model::OutputState;

/// A fire-and-forget lifecycle request for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OutputCommand {
    Start,
    Stop,
}

impl OutputCommand {
    /// The command a toggle issues from `state`.
    ///
    /// `None` while the output is transitioning: the server is already
    /// acting on an earlier request and a second one would race it.
    pub fn for_toggle(state: OutputState) -> Option<Self> {
        match state {
            OutputState::Stopped => Some(Self::Start),
            OutputState::Active => Some(Self::Stop),
            OutputState::Starting | OutputState::Stopping => None,
        }
    }
}
