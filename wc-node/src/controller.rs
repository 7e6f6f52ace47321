//! Actuation state machine for one flush node
//!
//! Two states, `Idle` and `Active`. The auto-off timer is a single deadline
//! slot: arming it again replaces the previous deadline, so at most one expiry
//! can ever fire per activation.
//!
//! The controller never touches the bus. Every transition returns the
//! messages the runtime should publish, which keeps it testable with plain
//! `Instant` values.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wc_protocol::{
    Action, CommandMessage, NodeIdentity, ProtocolError, ResponseReport, StatusReport, Topic,
};

use crate::relay::RelayOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Active,
}

/// A message the controller wants published
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Status(StatusReport),
    Response(ResponseReport),
}

impl Outbound {
    pub fn topic(&self, node_id: &str) -> String {
        match self {
            Outbound::Status(_) => Topic::status(node_id),
            Outbound::Response(_) => Topic::response(node_id),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Outbound::Status(status) => status.to_payload(),
            Outbound::Response(response) => response.to_payload(),
        }
    }
}

pub struct Controller<R: RelayOutput> {
    identity: NodeIdentity,
    relay: R,
    flush_duration: Duration,
    state: RelayState,
    auto_off_at: Option<Instant>,
}

impl<R: RelayOutput> Controller<R> {
    pub fn new(identity: NodeIdentity, relay: R, flush_duration: Duration) -> Self {
        Self {
            identity,
            relay,
            flush_duration,
            state: RelayState::Idle,
            auto_off_at: None,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == RelayState::Active
    }

    /// The pending auto-off deadline, if any
    pub fn auto_off_deadline(&self) -> Option<Instant> {
        self.auto_off_at
    }

    pub fn status_report(&self) -> StatusReport {
        StatusReport::online(&self.identity, self.is_active())
    }

    /// Decode a raw command payload and apply it. Malformed payloads are dropped.
    pub fn handle_payload(&mut self, payload: &[u8], now: Instant) -> Vec<Outbound> {
        match CommandMessage::decode(payload) {
            Ok(command) => self.handle_command(&command, now),
            Err(e) => {
                warn!("Dropping malformed command for {}: {}", self.identity.node_id, e);
                Vec::new()
            }
        }
    }

    pub fn handle_command(&mut self, command: &CommandMessage, now: Instant) -> Vec<Outbound> {
        debug!(
            "Command '{}' from {}",
            command.action,
            command.source.as_deref().unwrap_or("unknown")
        );

        match command.action() {
            Action::Flush => self.flush(now),
            Action::Stop => self.stop("Relay deactivated"),
            Action::StatusQuery => vec![Outbound::Status(self.status_report())],
            Action::Unknown => {
                warn!("Ignoring unknown action '{}'", command.action);
                Vec::new()
            }
        }
    }

    /// Fire the auto-off if its deadline has passed
    pub fn poll_timer(&mut self, now: Instant) -> Vec<Outbound> {
        match self.auto_off_at {
            Some(deadline) if deadline <= now => {
                info!("Auto-off timer expired after {:?}", self.flush_duration);
                self.stop("Relay deactivated (auto-off)")
            }
            _ => Vec::new(),
        }
    }

    /// Deassert the relay without publishing anything (process shutdown)
    pub fn shutdown(&mut self) {
        self.auto_off_at = None;
        self.state = RelayState::Idle;
        if let Err(e) = self.relay.set_active(false) {
            error!("Failed to release relay on shutdown: {}", e);
        }
    }

    fn flush(&mut self, now: Instant) -> Vec<Outbound> {
        if let Err(e) = self.relay.set_active(true) {
            error!("Failed to assert relay: {}", e);
            return vec![self.respond(Action::Flush, false, format!("Relay error: {e}"))];
        }

        let restarted = self.auto_off_at.is_some();
        self.state = RelayState::Active;
        self.auto_off_at = Some(now + self.flush_duration);

        if restarted {
            info!("Flush while active, auto-off restarted ({:?})", self.flush_duration);
        } else {
            info!("Flush started, auto-off in {:?}", self.flush_duration);
        }
        // Acknowledged on acceptance, not on physical completion.
        vec![self.respond(Action::Flush, true, "Flush accepted")]
    }

    fn stop(&mut self, message: &str) -> Vec<Outbound> {
        self.auto_off_at = None;
        self.state = RelayState::Idle;

        match self.relay.set_active(false) {
            Ok(()) => {
                info!("Relay stopped");
                vec![self.respond(Action::Stop, true, message)]
            }
            Err(e) => {
                error!("Failed to deassert relay: {}", e);
                vec![self.respond(Action::Stop, false, format!("Relay error: {e}"))]
            }
        }
    }

    fn respond(&self, action: Action, success: bool, message: impl Into<String>) -> Outbound {
        Outbound::Response(ResponseReport::new(&self.identity.node_id, action, success, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{RelayError, SimulatedRelay};
    use std::sync::{Arc, Mutex};

    const D: Duration = Duration::from_secs(5);

    /// Relay that records every level it was driven to
    #[derive(Clone, Default)]
    struct RecordingRelay {
        levels: Arc<Mutex<Vec<bool>>>,
        broken: bool,
    }

    impl RelayOutput for RecordingRelay {
        fn set_active(&mut self, active: bool) -> Result<(), RelayError> {
            if self.broken {
                return Err(RelayError::Io {
                    path: "/sys/class/gpio/gpio5/value".into(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            self.levels.lock().unwrap().push(active);
            Ok(())
        }
    }

    fn identity() -> NodeIdentity {
        NodeIdentity::new("wc_male_01", "male", "Male Room 1")
    }

    fn controller() -> Controller<SimulatedRelay> {
        Controller::new(identity(), SimulatedRelay::default(), D)
    }

    fn cmd(word: &str) -> CommandMessage {
        CommandMessage::new(word, "pc_host", Default::default())
    }

    fn responses(out: &[Outbound]) -> Vec<(String, bool)> {
        out.iter()
            .filter_map(|o| match o {
                Outbound::Response(r) => Some((r.action.clone(), r.success)),
                Outbound::Status(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_flush_from_idle_arms_single_timer() {
        for word in Action::FLUSH_WORDS {
            let mut ctl = controller();
            let t0 = Instant::now();
            let out = ctl.handle_command(&cmd(word), t0);

            assert_eq!(ctl.state(), RelayState::Active);
            assert!(ctl.relay.level());
            assert_eq!(ctl.auto_off_deadline(), Some(t0 + D));
            assert_eq!(responses(&out), vec![("flush".to_string(), true)]);
        }
    }

    #[test]
    fn test_flush_while_active_replaces_timer() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.handle_command(&cmd("flush"), t0);
        let out = ctl.handle_command(&cmd("on"), t0 + Duration::from_secs(1));

        assert_eq!(ctl.state(), RelayState::Active);
        assert_eq!(ctl.auto_off_deadline(), Some(t0 + Duration::from_secs(6)));
        assert_eq!(responses(&out), vec![("flush".to_string(), true)]);
    }

    #[test]
    fn test_second_flush_defers_auto_off_once() {
        let mut ctl = controller();
        let t0 = Instant::now();
        ctl.handle_command(&cmd("flush"), t0);
        ctl.handle_command(&cmd("flush"), t0 + Duration::from_secs(1));

        // The first deadline (t0+5) no longer exists.
        assert!(ctl.poll_timer(t0 + Duration::from_secs(5)).is_empty());
        assert!(ctl.is_active());

        let out = ctl.poll_timer(t0 + Duration::from_secs(6));
        assert_eq!(responses(&out), vec![("stop".to_string(), true)]);
        assert_eq!(ctl.state(), RelayState::Idle);

        // Nothing left to fire.
        assert!(ctl.poll_timer(t0 + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_auto_off_emits_stop_response() {
        let mut ctl = controller();
        let t0 = Instant::now();
        let out = ctl.handle_command(&cmd("flush"), t0);
        assert_eq!(responses(&out), vec![("flush".to_string(), true)]);

        assert!(ctl.poll_timer(t0 + D - Duration::from_millis(1)).is_empty());
        let out = ctl.poll_timer(t0 + D);
        assert_eq!(responses(&out), vec![("stop".to_string(), true)]);
        assert!(!ctl.relay.level());
        assert_eq!(ctl.auto_off_deadline(), None);
    }

    #[test]
    fn test_stop_always_returns_to_idle() {
        for word in Action::STOP_WORDS {
            let mut ctl = controller();
            let t0 = Instant::now();
            ctl.handle_command(&cmd("flush"), t0);
            let out = ctl.handle_command(&cmd(word), t0 + Duration::from_secs(2));
            assert_eq!(ctl.state(), RelayState::Idle);
            assert_eq!(ctl.auto_off_deadline(), None);
            assert_eq!(responses(&out), vec![("stop".to_string(), true)]);
            assert!(ctl.poll_timer(t0 + D).is_empty());

            // Stop while idle is still a stop.
            let out = ctl.handle_command(&cmd(word), t0 + Duration::from_secs(3));
            assert_eq!(ctl.state(), RelayState::Idle);
            assert_eq!(responses(&out), vec![("stop".to_string(), true)]);
        }
    }

    #[test]
    fn test_status_query_never_mutates() {
        let mut ctl = controller();
        let t0 = Instant::now();

        let out = ctl.handle_command(&cmd("status"), t0);
        assert_eq!(ctl.state(), RelayState::Idle);
        assert!(matches!(&out[..], [Outbound::Status(s)] if !s.relay_active));

        ctl.handle_command(&cmd("flush"), t0);
        let out = ctl.handle_command(&cmd("ping"), t0 + Duration::from_secs(2));
        assert_eq!(ctl.state(), RelayState::Active);
        assert_eq!(ctl.auto_off_deadline(), Some(t0 + D));
        assert!(matches!(&out[..], [Outbound::Status(s)] if s.relay_active));
        assert!(responses(&out).is_empty());
    }

    #[test]
    fn test_unknown_and_malformed_are_ignored() {
        let mut ctl = controller();
        let t0 = Instant::now();
        assert!(ctl.handle_command(&cmd("FLUSH"), t0).is_empty());
        assert!(ctl.handle_payload(b"", t0).is_empty());
        assert!(ctl.handle_payload(b"{\"no_action\":true}", t0).is_empty());
        assert_eq!(ctl.state(), RelayState::Idle);

        let out = ctl.handle_payload(b"activate", t0);
        assert_eq!(responses(&out), vec![("flush".to_string(), true)]);
    }

    #[test]
    fn test_command_with_odd_envelope_still_acts() {
        let mut ctl = controller();
        let t0 = Instant::now();
        let out = ctl.handle_payload(br#"{"action":"flush","timestamp":"2025-01-01T08:00:00Z"}"#, t0);
        assert_eq!(responses(&out), vec![("flush".to_string(), true)]);
        assert_eq!(ctl.state(), RelayState::Active);

        let out = ctl.handle_payload(br#"{"action":"stop","source":42}"#, t0);
        assert_eq!(responses(&out), vec![("stop".to_string(), true)]);
        assert_eq!(ctl.state(), RelayState::Idle);
    }

    #[test]
    fn test_relay_levels_follow_transitions() {
        let relay = RecordingRelay::default();
        let levels = relay.levels.clone();
        let mut ctl = Controller::new(identity(), relay, D);
        let t0 = Instant::now();

        ctl.handle_command(&cmd("flush"), t0);
        ctl.handle_command(&cmd("flush"), t0 + Duration::from_secs(1));
        ctl.poll_timer(t0 + Duration::from_secs(6));
        assert_eq!(*levels.lock().unwrap(), vec![true, true, false]);
    }

    #[test]
    fn test_broken_relay_reports_failure() {
        let relay = RecordingRelay { broken: true, ..Default::default() };
        let mut ctl = Controller::new(identity(), relay, D);
        let out = ctl.handle_command(&cmd("flush"), Instant::now());

        assert_eq!(responses(&out), vec![("flush".to_string(), false)]);
        assert_eq!(ctl.state(), RelayState::Idle);
        assert_eq!(ctl.auto_off_deadline(), None);
    }

    #[test]
    fn test_outbound_topics() {
        let ctl = controller();
        let status = Outbound::Status(ctl.status_report());
        assert_eq!(status.topic("wc_male_01"), "wc/wc_male_01/status");
        let value: serde_json::Value = serde_json::from_slice(&status.to_payload().unwrap()).unwrap();
        assert_eq!(value["status"], "online");
        assert_eq!(value["node_type"], "male");
        assert_eq!(value["room_name"], "Male Room 1");
        assert_eq!(value["relay_active"], false);
    }
}
