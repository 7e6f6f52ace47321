/*!
Mock MQTT Client pour développement sans broker

Côté sortant : enregistre tout ce que le dispatcher ou un node publie via
`Publisher`, et peut simuler un transport coupé.
Côté entrant : `simulate_incoming` pousse des messages dans le canal obtenu
par `setup_receiver`, comme le ferait l'event loop rumqttc.
*/

use rumqttc::QoS;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use anyhow::Result;
use wc_protocol::{BusError, Publisher};

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Bus MQTT simulé, partagé entre clones
#[derive(Clone)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
    accepting: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Canal des messages entrants simulés
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Simule un transport coupé : les publications suivantes sont refusées
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Simule la réception d'un message sur un topic abonné
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
        };

        let guard = self.message_sender.lock().unwrap();
        let Some(sender) = guard.as_ref() else {
            anyhow::bail!("no receiver set up for {}", message.topic);
        };
        log::info!("📨 [MOCK] Simulated incoming: {}", message.topic);
        sender.send(message).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un topic en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last_msg) => Ok(Some(serde_json::from_slice(&last_msg.payload)?)),
            None => Ok(None),
        }
    }
}

impl Default for MockMqttClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for MockMqttClient {
    fn publish_bytes(&self, topic: &str, payload: Vec<u8>) -> std::result::Result<(), BusError> {
        if !self.accepting.load(Ordering::SeqCst) {
            log::warn!("📵 [MOCK] Publish refused on {}", topic);
            return Err(BusError::Disconnected);
        }

        log::info!("📤 [MOCK] Published to {}: {} bytes", topic, payload.len());
        self.published_messages.lock().unwrap().push(MockMessage {
            topic: topic.to_string(),
            payload,
            qos: QoS::AtLeastOnce,
        });
        Ok(())
    }
}

/// Helper pour créer des payloads de test au format des nodes WC
pub struct WcMessageBuilder;

impl WcMessageBuilder {
    /// Crée un status tel que publié par un node (`wc/<node_id>/status`)
    pub fn status(node_id: &str, node_type: &str, room_name: &str, relay_active: bool) -> Value {
        serde_json::json!({
            "node_id": node_id,
            "status": "online",
            "node_type": node_type,
            "room_name": room_name,
            "relay_active": relay_active,
            "timestamp": Self::now(),
        })
    }

    /// Crée une réponse de commande (`wc/<node_id>/response`)
    pub fn response(node_id: &str, action: &str, success: bool, message: &str) -> Value {
        serde_json::json!({
            "node_id": node_id,
            "action": action,
            "success": success,
            "message": message,
            "timestamp": Self::now(),
        })
    }

    /// Crée une commande comme l'envoie le host (`wc/<node_id>/command`)
    pub fn command(action: &str, source: &str) -> Value {
        serde_json::json!({
            "action": action,
            "timestamp": Self::now(),
            "source": source,
        })
    }

    fn now() -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incoming_messages_reach_receiver() {
        let client = MockMqttClient::new();
        assert!(client.simulate_incoming("wc/wc1/command", "flush").await.is_err());

        let mut rx = client.setup_receiver();
        let command = WcMessageBuilder::command("stop", "pc_host");
        client
            .simulate_incoming("wc/wc1/command", serde_json::to_vec(&command).unwrap())
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic, "wc/wc1/command");
        let parsed: Value = serde_json::from_slice(&received.payload).unwrap();
        assert_eq!(parsed["source"], "pc_host");
        assert!(parsed["timestamp"].is_number());
        // Inbound traffic is not recorded as published.
        assert!(client.get_published_messages().is_empty());
    }

    #[test]
    fn test_publisher_refuses_when_disconnected() {
        let client = MockMqttClient::new();
        client.set_accepting(false);
        assert!(client.publish_bytes("wc/wc1/command", b"flush".to_vec()).is_err());
        assert!(client.get_published_messages().is_empty());

        client.set_accepting(true);
        assert!(client.publish_bytes("wc/wc1/command", b"flush".to_vec()).is_ok());
        assert_eq!(client.get_published_messages().len(), 1);
    }

    #[test]
    fn test_json_message_parsing() {
        let client = MockMqttClient::new();
        let status = WcMessageBuilder::status("wc1", "male", "Male Room 1", false);
        client.publish_bytes("wc/wc1/status", serde_json::to_vec(&status).unwrap()).unwrap();

        let parsed: Option<Value> = client.get_last_json_message("wc/wc1/status").unwrap();
        assert_eq!(parsed.unwrap()["room_name"], "Male Room 1");
        assert!(client.get_last_json_message::<Value>("wc/wc2/status").unwrap().is_none());
    }
}
