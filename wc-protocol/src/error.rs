use thiserror::Error;

/// Errors raised while parsing topics or decoding payloads
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("topic '{0}' is not a wc/<node_id>/<kind> topic")]
    InvalidTopic(String),
    #[error("invalid node id '{0}'")]
    InvalidNodeId(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transport refused to take a message
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus rejected publish: {0}")]
    Rejected(String),
    #[error("bus not connected")]
    Disconnected,
}
