// ── JSON-RPC wire types ──
//
// Everything that crosses the sealed channel as JSON. Enums reject
// unknown strings at deserialization so an unexpected server value never
// travels further than this module.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method names understood by the control server.
pub mod method {
    /// Notification: the session is authenticated and usable.
    pub const HELLO: &str = "hello";
    /// Request: full output snapshot.
    pub const OUTPUTS_GET: &str = "outputs/get";
    /// Request: begin starting an output.
    pub const OUTPUTS_START: &str = "outputs/start";
    /// Request: begin stopping an output.
    pub const OUTPUTS_STOP: &str = "outputs/stop";
    /// Request: change an output's broadcast delay.
    pub const OUTPUTS_SET_DELAY: &str = "outputs/setDelay";
    /// Notification: an output changed lifecycle state.
    pub const OUTPUTS_STATE_CHANGED: &str = "outputs/stateChanged";
}

// ── Output records ───────────────────────────────────────────────────

/// Lifecycle state of an output as reported by the server.
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

/// What kind of target an output is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputKind {
    LocalRecording,
    Streaming,
}

/// One entry of the `outputs/get` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub state: OutputState,
}

/// The `outputs/get` result: output id → record, in server order.
pub type OutputMap = IndexMap<String, OutputRecord>;

// ── Envelopes ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct RequestFrame<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Any message the server may send. Responses carry `id`, notifications
/// carry `method`.
#[derive(Debug, Deserialize)]
pub(crate) struct IncomingFrame {
    jsonrpc: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

pub(crate) enum Incoming {
    Response {
        id: u64,
        outcome: Result<Value, Error>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl IncomingFrame {
    pub(crate) fn classify(self) -> Result<Incoming, Error> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(Error::Protocol(format!(
                "unsupported jsonrpc version '{}'",
                self.jsonrpc
            )));
        }

        match (self.id, self.method) {
            (None, Some(method)) => Ok(Incoming::Notification {
                method,
                params: self.params,
            }),
            (Some(id), None) => {
                let outcome = match self.error {
                    Some(err) => Err(Error::Rpc {
                        code: err.code,
                        message: err.message,
                    }),
                    None => Ok(self.result.unwrap_or(Value::Null)),
                };
                Ok(Incoming::Response { id, outcome })
            }
            (Some(_), Some(method)) => Err(Error::Protocol(format!(
                "server-initiated request '{method}' is not supported"
            ))),
            (None, None) => Err(Error::Protocol(
                "message has neither id nor method".into(),
            )),
        }
    }
}

// ── Notifications ────────────────────────────────────────────────────

/// Server push notifications, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The session is ready; the client should fetch a full snapshot.
    Hello,
    /// An output moved to a new lifecycle state.
    OutputStateChanged { id: String, state: OutputState },
}

#[derive(Debug, Deserialize)]
struct StateChangedParams {
    id: String,
    state: OutputState,
}

/// Decode a notification. `Ok(None)` means the method is not one this
/// client understands.
pub(crate) fn parse_notification(method: &str, params: Value) -> Result<Option<Notification>, Error> {
    match method {
        method::HELLO => Ok(Some(Notification::Hello)),
        method::OUTPUTS_STATE_CHANGED => {
            let body = params.to_string();
            let p: StateChangedParams = serde_json::from_value(params)
                .map_err(|e| Error::deserialization(&e, body.as_bytes()))?;
            Ok(Some(Notification::OutputStateChanged {
                id: p.id,
                state: p.state,
            }))
        }
        _ => Ok(None),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn output_state_wire_strings() {
        assert_eq!(serde_json::to_value(OutputState::Active).unwrap(), json!("active"));
        assert_eq!(
            serde_json::from_value::<OutputState>(json!("stopping")).unwrap(),
            OutputState::Stopping
        );
        assert_eq!(OutputState::Starting.to_string(), "starting");
    }

    #[test]
    fn unknown_output_state_is_rejected() {
        assert!(serde_json::from_value::<OutputState>(json!("paused")).is_err());
    }

    #[test]
    fn deserialize_output_map_preserves_order() {
        let raw = json!({
            "rec": { "id": "rec", "name": "Recording", "type": "local_recording", "state": "stopped" },
            "r1": { "id": "r1", "name": "Twitch", "type": "streaming", "state": "active" }
        });
        let map: OutputMap = serde_json::from_value(raw).unwrap();
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["rec", "r1"]);
        assert_eq!(map["r1"].kind, OutputKind::Streaming);
        assert_eq!(map["rec"].state, OutputState::Stopped);
    }

    #[test]
    fn request_frame_omits_absent_params() {
        let frame = RequestFrame {
            jsonrpc: JSONRPC_VERSION,
            id: 7,
            method: method::OUTPUTS_GET,
            params: None,
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "jsonrpc": "2.0", "id": 7, "method": "outputs/get" })
        );
    }

    #[test]
    fn classify_success_response() {
        let frame: IncomingFrame =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 3, "result": {} })).unwrap();
        match frame.classify().unwrap() {
            Incoming::Response { id, outcome } => {
                assert_eq!(id, 3);
                assert_eq!(outcome.unwrap(), json!({}));
            }
            Incoming::Notification { .. } => panic!("expected response"),
        }
    }

    #[test]
    fn classify_error_response() {
        let frame: IncomingFrame = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": { "code": 0, "message": "The software failed to set the delay" }
        }))
        .unwrap();
        match frame.classify().unwrap() {
            Incoming::Response { outcome, .. } => {
                assert!(matches!(outcome, Err(Error::Rpc { code: 0, .. })));
            }
            Incoming::Notification { .. } => panic!("expected response"),
        }
    }

    #[test]
    fn classify_rejects_wrong_version() {
        let frame: IncomingFrame =
            serde_json::from_value(json!({ "jsonrpc": "1.0", "method": "hello" })).unwrap();
        assert!(matches!(frame.classify(), Err(Error::Protocol(_))));
    }

    #[test]
    fn parse_state_changed_notification() {
        let n = parse_notification(
            method::OUTPUTS_STATE_CHANGED,
            json!({ "id": "r1", "state": "active" }),
        )
        .unwrap();
        assert_eq!(
            n,
            Some(Notification::OutputStateChanged {
                id: "r1".into(),
                state: OutputState::Active,
            })
        );
    }

    #[test]
    fn parse_state_changed_with_unknown_state_fails() {
        let result = parse_notification(
            method::OUTPUTS_STATE_CHANGED,
            json!({ "id": "r1", "state": "exploding" }),
        );
        assert!(matches!(result, Err(Error::Deserialization { .. })));
    }

    #[test]
    fn parse_unknown_notification_is_none() {
        assert_eq!(parse_notification("scenes/changed", Value::Null).unwrap(), None);
    }
}
