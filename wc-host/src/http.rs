/**
 * API REST WC - Surface de contrôle HTTP du host
 *
 * RÔLE :
 * Seul appelant de l'API du dispatcher : dashboard, scripts, outils admin.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, routes : /health, /system/health, /api/status, /nodes, /api/send_command, /events
 * - Le statut online/offline est dérivé à chaque requête (fenêtre de liveness)
 * - POST /api/send_command publie sans attendre puis journalise un événement api_command
 *
 * SÉCURITÉ :
 * - Aucune authentification, à placer derrière le réseau local uniquement
 */

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use wc_protocol::{unix_now, Extra};

use crate::dispatcher::Dispatcher;
use crate::events::{EventRecord, EventType};
use crate::health::{HealthTracker, HostHealth};
use crate::models::NodeView;

const DEFAULT_EVENT_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub health: HealthTracker,
}

#[derive(Debug, Serialize)]
struct StatusView {
    nodes: Vec<NodeView>,
    total_nodes: usize,
    online_nodes: usize,
    mqtt_connected: bool,
    timestamp: f64,
}

#[derive(Debug, Deserialize)]
struct SendCommand {
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    action: String,
    #[serde(default)]
    extra: Extra,
}

#[derive(Debug, Deserialize)]
struct EventsParams {
    limit: Option<usize>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/status", get(get_status))
        .route("/nodes", get(get_nodes))
        .route("/nodes/{id}", get(get_node))
        .route("/api/send_command", post(send_command))
        .route("/events", get(get_events))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<HostHealth> {
    Json(app.health.get_health(&app.dispatcher))
}

// GET /api/status (vue dashboard)
async fn get_status(State(app): State<AppState>) -> Json<StatusView> {
    let nodes = app.dispatcher.views_at(OffsetDateTime::now_utc());
    let online_nodes = nodes.iter().filter(|n| n.status == "online").count();
    Json(StatusView {
        total_nodes: nodes.len(),
        online_nodes,
        nodes,
        mqtt_connected: app.health.is_mqtt_connected(),
        timestamp: unix_now(),
    })
}

// GET /nodes
async fn get_nodes(State(app): State<AppState>) -> Json<Vec<NodeView>> {
    Json(app.dispatcher.views_at(OffsetDateTime::now_utc()))
}

// GET /nodes/{id}
async fn get_node(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NodeView>, StatusCode> {
    match app.dispatcher.view_at(&id, OffsetDateTime::now_utc()) {
        Some(view) => Ok(Json(view)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

// POST /api/send_command
async fn send_command(
    State(app): State<AppState>,
    Json(req): Json<SendCommand>,
) -> (StatusCode, Json<Value>) {
    if req.node_id.is_empty() || req.action.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "node_id and action required" })),
        );
    }

    let accepted = app.dispatcher.publish_command(&req.node_id, &req.action, req.extra.clone());
    app.dispatcher.log_event(
        &req.node_id,
        EventType::ApiCommand,
        &json!({ "action": req.action, "extra": req.extra, "success": accepted }),
    );

    if accepted {
        (
            StatusCode::OK,
            Json(json!({ "success": true, "message": format!("Command '{}' sent to {}", req.action, req.node_id) })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "message": "Failed to send command" })),
        )
    }
}

// GET /events?limit=N
async fn get_events(
    State(app): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Json<Vec<EventRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    Json(app.dispatcher.recent_events(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Journal;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wc_devkit::{MockMqttClient, WcMessageBuilder};

    fn app() -> (MockMqttClient, AppState) {
        let mqtt = MockMqttClient::new();
        let dispatcher = Dispatcher::new(
            Arc::new(mqtt.clone()),
            Arc::new(Journal::in_memory(20)),
            time::Duration::seconds(30),
            "pc_host",
        );
        (mqtt, AppState { dispatcher, health: HealthTracker::new() })
    }

    async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let resp = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_and_node_views() {
        let (_mqtt, state) = app();
        let payload = WcMessageBuilder::status("wc_male_01", "male", "Male Room 1", true);
        state.dispatcher.handle_message("wc/wc_male_01/status", payload.to_string().as_bytes());

        let (code, body) = call(&state, get("/api/status")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["total_nodes"], 1);
        assert_eq!(body["online_nodes"], 1);
        assert_eq!(body["mqtt_connected"], false);
        assert_eq!(body["nodes"][0]["name"], "Male Room 1");
        assert_eq!(body["nodes"][0]["status"], "online");

        let (code, body) = call(&state, get("/nodes/wc_male_01")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["relay_active"], true);

        let (code, _) = call(&state, get("/nodes/wc_nope")).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_command_publishes_and_journals() {
        let (mqtt, state) = app();
        let (code, body) = call(
            &state,
            post_json("/api/send_command", json!({"node_id": "wc2", "action": "flush"})),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(mqtt.find_messages_by_topic("wc/wc2/command").len(), 1);

        let (_, events) = call(&state, get("/events?limit=5")).await;
        assert_eq!(events[0]["event_type"], "api_command");
        assert_eq!(events[0]["node_id"], "wc2");
        assert_eq!(events[0]["data"]["success"], true);
    }

    #[tokio::test]
    async fn test_send_command_errors() {
        let (mqtt, state) = app();
        let (code, body) = call(&state, post_json("/api/send_command", json!({"action": "flush"}))).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        mqtt.set_accepting(false);
        let (code, body) = call(
            &state,
            post_json("/api/send_command", json!({"node_id": "wc1", "action": "stop"})),
        )
        .await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);

        // Refused commands are journaled with their outcome.
        let events = state.dispatcher.recent_events(1);
        assert_eq!(events[0].event_type, EventType::ApiCommand);
        assert_eq!(events[0].data["action"], "stop");
        assert_eq!(events[0].data["success"], false);
    }

    #[tokio::test]
    async fn test_health_routes() {
        let (_mqtt, state) = app();
        let resp = build_router(state.clone()).oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let (code, body) = call(&state, get("/system/health")).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["nodes_tracked"], 0);
        assert_eq!(body["mqtt_status"], "connecting");
    }
}
