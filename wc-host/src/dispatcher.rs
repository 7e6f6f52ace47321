/**
 * DISPATCHER - Commandes vers les nodes + table de liveness dérivée
 *
 * RÔLE :
 * Traduit les demandes externes en commandes MQTT sans attendre d'acquittement,
 * consomme les status/réponses des nodes, tient la table des nodes connus.
 *
 * FONCTIONNEMENT :
 * - publish_command : fire-and-forget, retourne seulement si le transport a accepté
 * - on_status : upsert du NodeRecord (créé au premier status, jamais supprimé)
 * - on_response : journalisé + diffusé aux observateurs, sans effet sur la liveness
 * - is_online : calculé à chaque lecture (now - last_seen < fenêtre), aucun sweep
 * - subscribe : flux d'événements pour observateurs (journal debug en production)
 *
 * LIMITES ASSUMÉES :
 * - Pas de correlation id : la dernière réponse d'un node correspond à sa commande la plus récente
 * - Status hors ordre résolus par ordre d'arrivée, pas par timestamp embarqué
 */

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wc_protocol::{
    validate_node_id, CommandMessage, Extra, MessageKind, NodeIdentity, NodeStatus, Publisher,
    ResponseReport, StatusReport, Topic,
};

use crate::events::{EventLog, EventRecord, EventType};
use crate::models::{NodeRecord, NodeView, NodesMap};

const OBSERVER_CAPACITY: usize = 64;

/// Pushed to observers (dashboard, websocket bridge...) as messages flow
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatcherEvent {
    NodeStatus {
        node_id: String,
        relay_active: bool,
        data: Value,
    },
    CommandResponse {
        node_id: String,
        action: String,
        success: bool,
        data: Value,
    },
    CommandSent {
        node_id: String,
        action: String,
        accepted: bool,
    },
}

#[derive(Clone)]
pub struct Dispatcher {
    publisher: Arc<dyn Publisher>,
    events: Arc<dyn EventLog>,
    nodes: Arc<Mutex<NodesMap>>,
    observers: broadcast::Sender<DispatcherEvent>,
    liveness_window: Duration,
    source: String,
}

impl Dispatcher {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        events: Arc<dyn EventLog>,
        liveness_window: Duration,
        source: impl Into<String>,
    ) -> Self {
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            publisher,
            events,
            nodes: Arc::new(Mutex::new(NodesMap::new())),
            observers,
            liveness_window,
            source: source.into(),
        }
    }

    /// Newest first
    pub fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        self.events.recent(limit)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.observers.subscribe()
    }

    /// Publish a command to `wc/<node_id>/command`.
    ///
    /// Returns whether the transport accepted the message, never whether the
    /// node executed it. Unknown nodes are addressed all the same.
    pub fn publish_command(&self, node_id: &str, action: &str, extra: Extra) -> bool {
        if let Err(e) = validate_node_id(node_id) {
            warn!("command '{action}' not sent: {e}");
            return false;
        }

        let command = CommandMessage::new(action, &self.source, extra);
        let payload = match command.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("command '{action}' for {node_id} not serializable: {e}");
                return false;
            }
        };

        let topic = Topic::command(node_id);
        let accepted = match self.publisher.publish_bytes(&topic, payload) {
            Ok(()) => {
                info!("command '{action}' published on {topic}");
                true
            }
            Err(e) => {
                warn!("command '{action}' for {node_id} refused by transport: {e}");
                false
            }
        };

        self.notify(DispatcherEvent::CommandSent {
            node_id: node_id.to_string(),
            action: action.to_string(),
            accepted,
        });
        accepted
    }

    /// Route one inbound bus message. Malformed payloads are dropped.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        let topic = match Topic::parse(topic) {
            Ok(topic) => topic,
            Err(e) => {
                debug!("ignoring message: {e}");
                return;
            }
        };

        let data: Value = match serde_json::from_slice(payload) {
            Ok(data) => data,
            Err(e) if topic.kind != MessageKind::Command => {
                warn!("malformed {} from {}: {e}", topic.kind.as_str(), topic.node_id);
                return;
            }
            Err(_) => return,
        };

        match topic.kind {
            MessageKind::Status => match StatusReport::decode(payload) {
                Ok(report) => self.on_status(&topic.node_id, &report, &data),
                Err(e) => warn!("malformed status from {}: {e}", topic.node_id),
            },
            MessageKind::Response => match ResponseReport::decode(payload) {
                Ok(report) => self.on_response(&topic.node_id, &report, &data),
                Err(e) => warn!("malformed response from {}: {e}", topic.node_id),
            },
            MessageKind::Command => {}
        }
    }

    pub fn on_status(&self, node_id: &str, report: &StatusReport, data: &Value) {
        self.on_status_at(node_id, report, data, OffsetDateTime::now_utc());
    }

    /// Upsert the node record. Arrival order wins; embedded timestamps are ignored.
    pub fn on_status_at(&self, node_id: &str, report: &StatusReport, data: &Value, now: OffsetDateTime) {
        if report.status != NodeStatus::Online {
            debug!("{node_id} reported unexpected status {:?}", report.status);
        }

        {
            let mut nodes = self.nodes.lock();
            let record = nodes.entry(node_id.to_string()).or_insert_with(|| {
                info!("new node {node_id}");
                NodeRecord {
                    identity: NodeIdentity::placeholder(node_id),
                    relay_active: false,
                    last_seen: now,
                    last_status: Value::Null,
                }
            });

            let device_class = report
                .node_type
                .clone()
                .unwrap_or_else(|| record.identity.device_class.clone());
            let room_label = report
                .room_name
                .clone()
                .unwrap_or_else(|| record.identity.room_label.clone());
            record.identity = NodeIdentity::new(node_id, device_class, room_label);
            record.relay_active = report.relay_active;
            record.last_seen = record.last_seen.max(now);
            record.last_status = data.clone();
        }

        self.log_event(node_id, EventType::StatusUpdate, data);
        self.notify(DispatcherEvent::NodeStatus {
            node_id: node_id.to_string(),
            relay_active: report.relay_active,
            data: data.clone(),
        });
    }

    /// Journal and forward a response; the liveness table is left alone.
    pub fn on_response(&self, node_id: &str, report: &ResponseReport, data: &Value) {
        info!(
            "response from {node_id}: {} {}",
            report.action,
            if report.success { "SUCCESS" } else { "FAILED" }
        );
        self.log_event(node_id, EventType::CommandResponse, data);
        self.notify(DispatcherEvent::CommandResponse {
            node_id: node_id.to_string(),
            action: report.action.clone(),
            success: report.success,
            data: data.clone(),
        });
    }

    pub fn is_online(&self, node_id: &str) -> bool {
        self.is_online_at(node_id, OffsetDateTime::now_utc())
    }

    pub fn is_online_at(&self, node_id: &str, now: OffsetDateTime) -> bool {
        self.nodes
            .lock()
            .get(node_id)
            .is_some_and(|record| record.is_online_at(now, self.liveness_window))
    }

    /// API views of every known node, online flag from `is_online_at`
    pub fn views_at(&self, now: OffsetDateTime) -> Vec<NodeView> {
        self.nodes()
            .iter()
            .map(|record| self.view_of(record, now))
            .collect()
    }

    pub fn view_at(&self, node_id: &str, now: OffsetDateTime) -> Option<NodeView> {
        self.node(node_id).map(|record| self.view_of(&record, now))
    }

    fn view_of(&self, record: &NodeRecord, now: OffsetDateTime) -> NodeView {
        let online = self.is_online_at(&record.identity.node_id, now);
        NodeView::from_record(record, now, online)
    }

    pub fn node(&self, node_id: &str) -> Option<NodeRecord> {
        self.nodes.lock().get(node_id).cloned()
    }

    /// Snapshot of every known node, sorted by id
    pub fn nodes(&self) -> Vec<NodeRecord> {
        let mut nodes: Vec<NodeRecord> = self.nodes.lock().values().cloned().collect();
        nodes.sort_by(|a, b| a.identity.node_id.cmp(&b.identity.node_id));
        nodes
    }

    pub fn log_event(&self, node_id: &str, event_type: EventType, data: &Value) {
        if let Err(e) = self.events.append(node_id, event_type, data.clone()) {
            warn!("failed to journal {event_type:?} for {node_id}: {e}");
        }
    }

    /// Debug-log every observer event until the dispatcher goes away
    pub fn spawn_observer_log(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => debug!("dispatcher event {line}"),
                        Err(e) => warn!("unserializable dispatcher event: {e}"),
                    },
                    Err(RecvError::Lagged(missed)) => warn!("observer log lagged, {missed} events skipped"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn notify(&self, event: DispatcherEvent) {
        // No subscriber is not an error.
        let _ = self.observers.send(event);
    }
}
