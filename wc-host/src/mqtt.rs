use crate::config::HostConfig;
use crate::dispatcher::Dispatcher;
use crate::health::HealthTracker;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::task;
use tracing::{debug, info, warn};
use wc_protocol::topics::{RESPONSE_FILTER, STATUS_FILTER};

pub fn mqtt_options(cfg: &HostConfig) -> MqttOptions {
    // Suffixe unique: deux hosts avec le même client_id se déconnecteraient mutuellement
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let client_id = format!("{}-{}", cfg.mqtt.client_id, &suffix[..8]);

    let mut opts = MqttOptions::new(client_id, &cfg.mqtt.host, cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_secs.max(5)));
    opts.set_clean_session(true);
    if let (Some(user), Some(pass)) = (&cfg.mqtt.username, &cfg.mqtt.password) {
        opts.set_credentials(user, pass);
    }
    opts
}

pub fn create_mqtt_client(cfg: &HostConfig) -> (AsyncClient, EventLoop) {
    info!("MQTT broker {}:{}", cfg.mqtt.host, cfg.mqtt.port);
    AsyncClient::new(mqtt_options(cfg), 64)
}

/// Drive the event loop: (re)subscribe on every ConnAck, route publishes to the dispatcher
pub fn spawn_mqtt_listener(
    dispatcher: Dispatcher,
    health: HealthTracker,
    client: AsyncClient,
    mut eventloop: EventLoop,
    reconnect_delay: Duration,
) -> task::JoinHandle<()> {
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("MQTT connecté, abonnement {STATUS_FILTER} + {RESPONSE_FILTER}");
                    health.mark_mqtt_connected();
                    for filter in [STATUS_FILTER, RESPONSE_FILTER] {
                        if let Err(e) = client.try_subscribe(filter, QoS::AtLeastOnce) {
                            warn!("subscribe {filter} échoué: {e}");
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) => {
                    debug!("MQTT {} ({} bytes)", p.topic, p.payload.len());
                    dispatcher.handle_message(&p.topic, &p.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT erreur: {e}, nouvelle tentative dans {reconnect_delay:?}");
                    health.increment_reconnects();
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    })
}
