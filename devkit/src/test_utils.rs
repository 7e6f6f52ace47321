/*!
Test Harness pour le host et les nodes WC

Facilite l'écriture de tests avec:
- Setup automatique du client MQTT mock
- Décodage typé des messages publiés (commandes, status, réponses)
- Assertions sur les événements échangés
*/

use crate::mqtt_stub::MockMqttClient;
use serde_json::Value;
use anyhow::Result;
use wc_protocol::{CommandMessage, ResponseReport, StatusReport, Topic};

/// Harness de test autour d'un bus MQTT simulé
pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
}

impl TestHarness {
    /// Crée un nouveau harness de test
    pub fn new() -> Self {
        env_logger::builder().is_test(true).try_init().ok(); // Init logging pour tests

        Self { mqtt_client: MockMqttClient::new() }
    }

    /// Commandes publiées vers un node, dans l'ordre d'émission
    pub fn commands_for(&self, node_id: &str) -> Result<Vec<CommandMessage>> {
        self.mqtt_client
            .find_messages_by_topic(&Topic::command(node_id))
            .iter()
            .map(|msg| CommandMessage::decode(&msg.payload).map_err(Into::into))
            .collect()
    }

    /// Status publiés par un node
    pub fn statuses_from(&self, node_id: &str) -> Result<Vec<StatusReport>> {
        self.mqtt_client
            .find_messages_by_topic(&Topic::status(node_id))
            .iter()
            .map(|msg| StatusReport::decode(&msg.payload).map_err(Into::into))
            .collect()
    }

    /// Réponses publiées par un node
    pub fn responses_from(&self, node_id: &str) -> Result<Vec<ResponseReport>> {
        self.mqtt_client
            .find_messages_by_topic(&Topic::response(node_id))
            .iter()
            .map(|msg| ResponseReport::decode(&msg.payload).map_err(Into::into))
            .collect()
    }

    /// Assert qu'un champ a une valeur spécifique dans le dernier message
    pub fn assert_field_equals(&self, topic: &str, field_path: &str, expected: &Value) -> Result<()> {
        let Some(msg) = self.mqtt_client.get_last_json_message::<Value>(topic)? else {
            anyhow::bail!("No message on {}", topic);
        };
        match get_nested_field(&msg, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch: expected {:?}, got {:?}",
                field_path, expected, actual
            ),
            None => anyhow::bail!("Field '{}' not found in latest message on {}", field_path, topic),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(obj) => current = obj.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}
