use crate::error::BusError;
use rumqttc::{AsyncClient, QoS};

/// Hands a payload to the bus without waiting for delivery.
///
/// `Ok` only means the transport accepted the message into its queue.
pub trait Publisher: Send + Sync {
    fn publish_bytes(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

impl Publisher for AsyncClient {
    fn publish_bytes(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        AsyncClient::try_publish(self, topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| BusError::Rejected(e.to_string()))
    }
}
