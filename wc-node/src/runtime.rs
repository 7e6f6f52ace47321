//! MQTT event loop for a flush node
//!
//! One cooperative task interleaves:
//! - inbound command dequeue (`eventloop.poll()`)
//! - auto-off timer expiry
//! - periodic status publication
//!
//! Connection loss pauses bus polling for a fixed delay while the timer keeps
//! running, so a relay still turns off on time during an outage. Nothing is
//! queued while disconnected and missed commands are not replayed.

use anyhow::Result;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use wc_protocol::{Publisher, Topic};

use crate::config::NodeConfig;
use crate::controller::{Controller, Outbound};
use crate::relay::RelayOutput;

const DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(30);

/// Publishes controller output, but only while the bus is up
pub struct Emitter<P: Publisher> {
    publisher: P,
    node_id: String,
    connected: bool,
}

impl<P: Publisher> Emitter<P> {
    pub fn new(publisher: P, node_id: &str) -> Self {
        Self {
            publisher,
            node_id: node_id.to_string(),
            connected: false,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns how many messages were handed to the transport
    pub fn emit(&self, outbound: Vec<Outbound>) -> usize {
        let mut sent = 0;
        for message in outbound {
            let topic = message.topic(&self.node_id);
            if !self.connected {
                debug!("Disconnected, dropping message for {}", topic);
                continue;
            }
            let payload = match message.to_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to serialize message for {}: {}", topic, e);
                    continue;
                }
            };
            match self.publisher.publish_bytes(&topic, payload) {
                Ok(()) => sent += 1,
                Err(e) => warn!("Failed to publish on {}: {}", topic, e),
            }
        }
        sent
    }
}

fn mqtt_options(config: &NodeConfig) -> MqttOptions {
    let mut options = MqttOptions::new(
        config.client_id(),
        &config.mqtt.broker_host,
        config.mqtt.broker_port,
    );
    options.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));
    options.set_clean_session(true);
    if let (Some(user), Some(pass)) = (&config.mqtt.username, &config.mqtt.password) {
        options.set_credentials(user, pass);
    }
    options
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run the node until Ctrl-C; the relay is released on the way out
pub async fn run<R: RelayOutput>(config: NodeConfig, relay: R) -> Result<()> {
    let identity = config.identity();
    let node_id = identity.node_id.clone();
    let command_topic = Topic::command(&node_id);

    let mut controller = Controller::new(identity, relay, config.actuator.flush_duration());
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config), 10);
    let mut emitter = Emitter::new(client.clone(), &node_id);

    let mut status_timer = interval(config.status_interval());
    status_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut diagnostic_timer = interval(DIAGNOSTIC_INTERVAL);

    let mut reconnect_at: Option<Instant> = None;
    let mut failed_attempts: u32 = 0;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Node {} connecting to {}:{} (auto-off {:?})",
        node_id,
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        config.actuator.flush_duration()
    );

    loop {
        tokio::select! {
            event = eventloop.poll(), if reconnect_at.is_none() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    failed_attempts = 0;
                    emitter.set_connected(true);
                    // Clean session: the subscription must be renewed on every connect.
                    if let Err(e) = client.try_subscribe(command_topic.as_str(), QoS::AtLeastOnce) {
                        warn!("Failed to subscribe to {}: {}", command_topic, e);
                    }
                    info!("Connected, listening on {}", command_topic);
                    emitter.emit(vec![Outbound::Status(controller.status_report())]);
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) if publish.topic == command_topic => {
                    let outbound = controller.handle_payload(&publish.payload, Instant::now());
                    emitter.emit(outbound);
                }
                Ok(_) => {}
                Err(e) => {
                    failed_attempts += 1;
                    emitter.set_connected(false);
                    warn!(
                        "MQTT connection error (attempt {}): {}. Retrying in {:?}",
                        failed_attempts, e, config.reconnect_delay()
                    );
                    reconnect_at = Some(Instant::now() + config.reconnect_delay());
                }
            },
            _ = wait_until(reconnect_at) => {
                reconnect_at = None;
            }
            _ = wait_until(controller.auto_off_deadline()) => {
                let outbound = controller.poll_timer(Instant::now());
                emitter.emit(outbound);
            }
            _ = status_timer.tick() => {
                if emitter.is_connected() {
                    emitter.emit(vec![Outbound::Status(controller.status_report())]);
                }
            }
            _ = diagnostic_timer.tick() => {
                debug!(
                    "Status: MQTT={}, Relay={:?}",
                    if emitter.is_connected() { "connected" } else { "disconnected" },
                    controller.state()
                );
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, releasing relay");
                controller.shutdown();
                return Ok(());
            }
        }
    }
}
