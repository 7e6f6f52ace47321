/**
 * WC HOST - Point d'entrée du dispatcher central
 *
 * RÔLE : Orchestration des modules : config, journal, MQTT, dispatcher, HTTP, health.
 * Bootstrap du host avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : Commandes fire-and-forget vers les nodes + table de liveness dérivée des status.
 */

mod config;
mod dispatcher;
mod events;
mod health;
mod http;
mod models;
mod mqtt;

use crate::config::load_config;
use crate::dispatcher::Dispatcher;
use crate::events::{EventLog, Journal};
use crate::health::HealthTracker;
use crate::http::AppState;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = load_config().await;

    // journal d'événements
    let journal: Arc<dyn EventLog> = match &cfg.event_log.path {
        Some(path) => match Journal::open(path, cfg.event_log.recent_capacity) {
            Ok(journal) => Arc::new(journal),
            Err(e) => {
                warn!("journal {path:?} indisponible ({e}), événements en mémoire seulement");
                Arc::new(Journal::in_memory(cfg.event_log.recent_capacity))
            }
        },
        None => Arc::new(Journal::in_memory(cfg.event_log.recent_capacity)),
    };

    let health = HealthTracker::new();
    let (client, eventloop) = mqtt::create_mqtt_client(&cfg);
    let dispatcher = Dispatcher::new(
        Arc::new(client.clone()),
        journal,
        cfg.liveness_window(),
        cfg.source.clone(),
    );

    // observateur : trace debug des événements du dispatcher
    dispatcher.spawn_observer_log();

    // MQTT remplit la table des nodes
    mqtt::spawn_mqtt_listener(
        dispatcher.clone(),
        health.clone(),
        client,
        eventloop,
        cfg.reconnect_delay(),
    );

    let app = http::build_router(AppState { dispatcher, health });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("bind {}", cfg.http.bind))?;
    info!("🚽 WC host listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}
