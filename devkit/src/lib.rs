/*!
# WC DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant les tests du host et des nodes WC avec:
- Client MQTT mock (implémente `wc_protocol::Publisher`) pour tests sans broker
- Builders de payloads conformes aux topics `wc/<node_id>/...`
- Harness d'assertions sur les messages publiés
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{MockMqttClient, WcMessageBuilder};
pub use test_utils::TestHarness;
