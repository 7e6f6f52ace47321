use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HostConfig {
    pub mqtt: MqttConf,
    /// A node is online while its last status is younger than this
    pub liveness_window_secs: u64,
    /// Written into the `source` field of every command
    pub source: String,
    pub reconnect_delay_secs: u64,
    pub http: HttpConf,
    pub event_log: EventLogConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EventLogConf {
    /// JSON-lines journal; `None` keeps events in memory only
    pub path: Option<PathBuf>,
    pub recent_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConf::default(),
            liveness_window_secs: 30,
            source: "pc_host".into(),
            reconnect_delay_secs: 2,
            http: HttpConf::default(),
            event_log: EventLogConf::default(),
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "pc_host".into(),
            keep_alive_secs: 60,
            username: None,
            password: None,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5000".into() }
    }
}

impl Default for EventLogConf {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("./data/events.jsonl")),
            recent_capacity: 200,
        }
    }
}

impl HostConfig {
    pub fn liveness_window(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.liveness_window_secs).unwrap_or(i64::MAX))
    }

    pub fn reconnect_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconnect_delay_secs.max(1))
    }

    /// `WC_MQTT_HOST` / `WC_MQTT_PORT` / `WC_MQTT_USERNAME` / `WC_MQTT_PASSWORD` win over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("WC_MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = std::env::var("WC_MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(_) => warn!("WC_MQTT_PORT invalide: {port}"),
            }
        }
        if let Ok(user) = std::env::var("WC_MQTT_USERNAME") {
            self.mqtt.username = Some(user);
        }
        if let Ok(pass) = std::env::var("WC_MQTT_PASSWORD") {
            self.mqtt.password = Some(pass);
        }
    }
}

pub fn parse_config(txt: &str) -> HostConfig {
    if txt.trim().is_empty() {
        return HostConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("config invalide: {e}");
        HostConfig::default()
    })
}

pub async fn load_config() -> HostConfig {
    let path = std::env::var("WC_HOST_CONFIG").unwrap_or_else(|_| "host.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        warn!("pas de {path}, usage config par défaut");
        HostConfig::default()
    };
    cfg.apply_env_overrides();
    cfg
}
