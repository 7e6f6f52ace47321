/**
 * JOURNAL D'ÉVÉNEMENTS - Historique append-only des messages observés
 *
 * RÔLE :
 * Trace chaque status, réponse de node et commande API reçue par le host.
 * Le stockage durable (SQL, rétention) reste un collaborateur externe.
 *
 * FONCTIONNEMENT :
 * - EventLog trait = interface d'écriture + lecture des événements récents
 * - Journal = fichier JSON lines (une ligne par événement) + cache mémoire borné
 * - Au démarrage, la fin du fichier existant recharge le cache et les IDs
 */

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use wc_protocol::unix_now;

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StatusUpdate,
    CommandResponse,
    ApiCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub timestamp: f64,
    pub node_id: String,
    pub event_type: EventType,
    pub data: Value,
}

/// Append-only record of dispatcher events
pub trait EventLog: Send + Sync {
    fn append(&self, node_id: &str, event_type: EventType, data: Value) -> Result<EventRecord, EventLogError>;

    /// Newest first
    fn recent(&self, limit: usize) -> Vec<EventRecord>;
}

struct JournalState {
    recent: VecDeque<EventRecord>,
    next_id: u64,
}

pub struct Journal {
    path: Option<PathBuf>,
    capacity: usize,
    state: Mutex<JournalState>,
}

impl Journal {
    /// Journal that only keeps the in-memory window
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            path: None,
            capacity: capacity.max(1),
            state: Mutex::new(JournalState { recent: VecDeque::new(), next_id: 1 }),
        }
    }

    /// Journal backed by a JSON-lines file, reloading its tail
    pub fn open<P: Into<PathBuf>>(path: P, capacity: usize) -> Result<Self, EventLogError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut journal = Self::in_memory(capacity);
        if path.exists() {
            journal.load_tail(&path)?;
        }
        info!("event journal at {:?} ({} events reloaded)", path, journal.state.lock().recent.len());
        journal.path = Some(path);
        Ok(journal)
    }

    fn load_tail(&mut self, path: &Path) -> Result<(), EventLogError> {
        let content = fs::read_to_string(path)?;
        let state = self.state.get_mut();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<EventRecord>(line) {
                Ok(record) => {
                    state.next_id = state.next_id.max(record.id + 1);
                    state.recent.push_back(record);
                    if state.recent.len() > self.capacity {
                        state.recent.pop_front();
                    }
                }
                Err(e) => warn!("skipping corrupt journal line: {e}"),
            }
        }
        Ok(())
    }
}

impl EventLog for Journal {
    fn append(&self, node_id: &str, event_type: EventType, data: Value) -> Result<EventRecord, EventLogError> {
        let mut state = self.state.lock();
        let record = EventRecord {
            id: state.next_id,
            timestamp: unix_now(),
            node_id: node_id.to_string(),
            event_type,
            data,
        };

        if let Some(path) = &self.path {
            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(line.as_bytes())?;
        }

        state.next_id += 1;
        state.recent.push_back(record.clone());
        if state.recent.len() > self.capacity {
            state.recent.pop_front();
        }
        Ok(record)
    }

    fn recent(&self, limit: usize) -> Vec<EventRecord> {
        self.state.lock().recent.iter().rev().take(limit).cloned().collect()
    }
}
