use crate::error::ProtocolError;

pub const TOPIC_ROOT: &str = "wc";

/// Subscription filters used by the host
pub const STATUS_FILTER: &str = "wc/+/status";
pub const RESPONSE_FILTER: &str = "wc/+/response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command,
    Status,
    Response,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Command => "command",
            MessageKind::Status => "status",
            MessageKind::Response => "response",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "command" => Some(MessageKind::Command),
            "status" => Some(MessageKind::Status),
            "response" => Some(MessageKind::Response),
            _ => None,
        }
    }
}

/// A parsed `wc/<node_id>/<kind>` topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub node_id: String,
    pub kind: MessageKind,
}

impl Topic {
    pub fn new(node_id: impl Into<String>, kind: MessageKind) -> Self {
        Self { node_id: node_id.into(), kind }
    }

    pub fn command(node_id: &str) -> String {
        Self::new(node_id, MessageKind::Command).to_string()
    }

    pub fn status(node_id: &str) -> String {
        Self::new(node_id, MessageKind::Status).to_string()
    }

    pub fn response(node_id: &str) -> String {
        Self::new(node_id, MessageKind::Response).to_string()
    }

    pub fn parse(topic: &str) -> Result<Self, ProtocolError> {
        let mut parts = topic.split('/');
        let (Some(root), Some(node_id), Some(kind), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::InvalidTopic(topic.to_string()));
        };
        if root != TOPIC_ROOT || node_id.is_empty() {
            return Err(ProtocolError::InvalidTopic(topic.to_string()));
        }
        let kind = MessageKind::from_segment(kind)
            .ok_or_else(|| ProtocolError::InvalidTopic(topic.to_string()))?;
        Ok(Self::new(node_id, kind))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", TOPIC_ROOT, self.node_id, self.kind.as_str())
    }
}

/// Node ids become a topic level, so MQTT metacharacters are refused.
pub fn validate_node_id(node_id: &str) -> Result<(), ProtocolError> {
    if node_id.is_empty() || node_id.contains(['/', '+', '#']) || node_id.trim() != node_id {
        return Err(ProtocolError::InvalidNodeId(node_id.to_string()));
    }
    Ok(())
}
