use crate::action::Action;
use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Free-form fields carried alongside a command
pub type Extra = serde_json::Map<String, Value>;

/// Keys owned by the command envelope; callers cannot override them through `extra`.
pub const RESERVED_COMMAND_KEYS: &[&str] = &["action", "timestamp", "source"];

/// Unix time in seconds, the timestamp format used on the wire
pub fn unix_now() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

/// Immutable description of one flush node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: String,
    pub device_class: String,
    pub room_label: String,
}

impl NodeIdentity {
    pub fn new(node_id: impl Into<String>, device_class: impl Into<String>, room_label: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            device_class: device_class.into(),
            room_label: room_label.into(),
        }
    }

    /// Identity inferred by the host before a node has described itself
    pub fn placeholder(node_id: &str) -> Self {
        Self::new(node_id, "unknown", format!("Node {node_id}"))
    }
}

/// host → node, on `wc/<node_id>/command`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub action: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl CommandMessage {
    pub fn new(action: impl Into<String>, source: impl Into<String>, mut extra: Extra) -> Self {
        for key in RESERVED_COMMAND_KEYS {
            extra.remove(*key);
        }
        Self {
            action: action.into(),
            timestamp: Some(unix_now()),
            source: Some(source.into()),
            extra,
        }
    }

    pub fn action(&self) -> Action {
        Action::parse(&self.action)
    }

    /// Accepts a JSON object, a JSON string, or a bare action word.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| ProtocolError::Malformed(format!("not utf-8: {e}")))?
            .trim();
        if text.is_empty() {
            return Err(ProtocolError::Malformed("empty command".into()));
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(_)) => decode_json(text.as_bytes()),
            Ok(Value::String(word)) => Ok(Self::bare(word)),
            Ok(other) => Err(ProtocolError::Malformed(format!("unexpected command json: {other}"))),
            Err(_) => Ok(Self::bare(text.to_string())),
        }
    }

    fn bare(word: String) -> Self {
        Self { action: word, timestamp: None, source: None, extra: Extra::new() }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Nodes only ever say "online"; anything else is kept but flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeStatus {
    Online,
    Unrecognized,
}

impl From<String> for NodeStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "online" => NodeStatus::Online,
            _ => NodeStatus::Unrecognized,
        }
    }
}

impl From<NodeStatus> for String {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Online => "online".into(),
            NodeStatus::Unrecognized => "unrecognized".into(),
        }
    }
}

/// node → host, on `wc/<node_id>/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub status: NodeStatus,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub relay_active: bool,
    /// Informational only; the host orders statuses by arrival
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl StatusReport {
    pub fn online(identity: &NodeIdentity, relay_active: bool) -> Self {
        Self {
            node_id: Some(identity.node_id.clone()),
            status: NodeStatus::Online,
            node_type: Some(identity.device_class.clone()),
            room_name: Some(identity.room_label.clone()),
            relay_active,
            timestamp: Some(unix_now()),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        decode_json(payload)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// node → host, on `wc/<node_id>/response`.
///
/// `success` means the node's handler accepted the command, not that the
/// actuation physically completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseReport {
    #[serde(default)]
    pub node_id: String,
    pub action: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl ResponseReport {
    pub fn new(node_id: &str, action: Action, success: bool, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.to_string(),
            action: action.canonical().to_string(),
            success,
            message: message.into(),
            timestamp: Some(unix_now()),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        decode_json(payload)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

fn decode_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Envelope fields nobody acts on: a value of the wrong type reads as absent
/// instead of rejecting the whole message.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Firmware variants publish the relay state as a bool, a pin level (0/1)
/// or a string. Anything unreadable counts as inactive.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|level| level != 0.0),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "yes"
        ),
        _ => false,
    })
}
