use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use wc_protocol::NodeIdentity;

/// Host-side view of a node, derived from its status messages
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub identity: NodeIdentity,
    pub relay_active: bool,
    pub last_seen: OffsetDateTime,
    /// Raw payload of the latest status
    pub last_status: Value,
}

impl NodeRecord {
    pub fn is_online_at(&self, now: OffsetDateTime, window: Duration) -> bool {
        now - self.last_seen < window
    }
}

pub type NodesMap = HashMap<String, NodeRecord>;

/// API representation of a node record
#[derive(Debug, Serialize)]
pub struct NodeView {
    pub node_id: String,
    pub name: String,
    pub node_type: String,
    pub status: &'static str,
    pub relay_active: bool,
    pub last_seen: String,
    pub seconds_since_seen: i64,
    pub data: Value,
}

impl NodeView {
    pub fn from_record(record: &NodeRecord, now: OffsetDateTime, online: bool) -> Self {
        NodeView {
            node_id: record.identity.node_id.clone(),
            name: record.identity.room_label.clone(),
            node_type: record.identity.device_class.clone(),
            status: if online { "online" } else { "offline" },
            relay_active: record.relay_active,
            last_seen: record.last_seen.format(&Rfc3339).unwrap_or_default(),
            seconds_since_seen: (now - record.last_seen).whole_seconds().max(0),
            data: record.last_status.clone(),
        }
    }
}
