//! Node configuration
//!
//! Loaded from a TOML file (`WC_NODE_CONFIG`, default `node.toml`):
//! - Identity (node id, device class, room label)
//! - MQTT broker settings
//! - Actuator wiring and auto-off duration
//! - Status / reconnect timing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use wc_protocol::{validate_node_id, NodeIdentity};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid node id: {0}")]
    NodeId(#[from] wc_protocol::ProtocolError),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    pub node_id: String,
    #[serde(default = "default_device_class")]
    pub device_class: String,
    pub room_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Auto-off delay after a flush; `None` means the 5s default
    pub flush_duration_secs: Option<u64>,
    pub relay_gpio: Option<PathBuf>,
    pub indicator_gpio: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub status_interval_secs: u64,
    pub reconnect_delay_secs: u64,
}

fn default_device_class() -> String {
    "other".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            client_id: None,
            keep_alive_secs: 60,
            username: None,
            password: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 10,
            reconnect_delay_secs: 10,
        }
    }
}

impl ActuatorConfig {
    pub const DEFAULT_FLUSH_SECS: u64 = 5;

    pub fn flush_duration(&self) -> Duration {
        Duration::from_secs(self.flush_duration_secs.unwrap_or(Self::DEFAULT_FLUSH_SECS))
    }
}

impl NodeConfig {
    /// Load config from `WC_NODE_CONFIG` (or `node.toml` in the working directory)
    pub async fn load() -> Result<Self> {
        let path = Self::config_file_path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read node config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid node config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_file_path() -> PathBuf {
        std::env::var("WC_NODE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("node.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_node_id(&self.node.node_id)?;
        if self.actuator.flush_duration_secs == Some(0) {
            return Err(ConfigError::ZeroDuration("actuator.flush_duration_secs"));
        }
        if self.timing.status_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("timing.status_interval_secs"));
        }
        if self.timing.reconnect_delay_secs == 0 {
            return Err(ConfigError::ZeroDuration("timing.reconnect_delay_secs"));
        }
        Ok(())
    }

    pub fn identity(&self) -> NodeIdentity {
        let room_label = self
            .node
            .room_label
            .clone()
            .unwrap_or_else(|| format!("Node {}", self.node.node_id));
        NodeIdentity::new(&self.node.node_id, &self.node.device_class, room_label)
    }

    /// Broker client id; a random suffix keeps a rebooted node from colliding with its ghost session
    pub fn client_id(&self) -> String {
        self.mqtt.client_id.clone().unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{}_{}", self.node.node_id, &suffix[..8])
        })
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.timing.status_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.timing.reconnect_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [node]
        node_id = "wc_male_01"
        device_class = "male"
        room_label = "Male Room 1"

        [mqtt]
        broker_host = "192.168.1.181"
        broker_port = 1883
        keep_alive_secs = 30

        [actuator]
        flush_duration_secs = 4
        relay_gpio = "/sys/class/gpio/gpio5/value"

        [timing]
        status_interval_secs = 30
    "#;

    #[test]
    fn test_full_config() {
        let config = NodeConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.mqtt.broker_host, "192.168.1.181");
        assert_eq!(config.actuator.flush_duration(), Duration::from_secs(4));
        assert_eq!(config.status_interval(), Duration::from_secs(30));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(10));

        let identity = config.identity();
        assert_eq!(identity.node_id, "wc_male_01");
        assert_eq!(identity.device_class, "male");
        assert_eq!(identity.room_label, "Male Room 1");
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = NodeConfig::from_toml_str("[node]\nnode_id = \"wc3\"\n").unwrap();
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.actuator.flush_duration(), Duration::from_secs(5));
        assert_eq!(config.identity().device_class, "other");
        assert_eq!(config.identity().room_label, "Node wc3");
        assert!(config.client_id().starts_with("wc3_"));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(NodeConfig::from_toml_str("[node]\nnode_id = \"wc/3\"\n").is_err());
        assert!(NodeConfig::from_toml_str("[node]\nnode_id = \"\"\n").is_err());
        assert!(NodeConfig::from_toml_str(
            "[node]\nnode_id = \"wc3\"\n[actuator]\nflush_duration_secs = 0\n"
        )
        .is_err());
        assert!(NodeConfig::from_toml_str(
            "[node]\nnode_id = \"wc3\"\n[timing]\nstatus_interval_secs = 0\n"
        )
        .is_err());
    }
}
