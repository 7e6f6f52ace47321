//! WC Protocol - wire contract between the host dispatcher and flush nodes
//!
//! Everything that crosses the bus lives here:
//! - Topic layout (`wc/<node_id>/command|status|response`)
//! - JSON payloads for commands, status reports and responses
//! - The action vocabulary and its synonym sets
//! - The `Publisher` seam used by both sides to hand bytes to the bus

pub mod action;
pub mod bus;
pub mod error;
pub mod messages;
pub mod topics;

pub use action::Action;
pub use bus::Publisher;
pub use error::{BusError, ProtocolError};
pub use messages::{unix_now, CommandMessage, Extra, NodeIdentity, NodeStatus, ResponseReport, StatusReport};
pub use topics::{validate_node_id, MessageKind, Topic};
