use std::fmt;

/// Action requested by a command, after synonym resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Flush,
    Stop,
    StatusQuery,
    Unknown,
}

impl Action {
    pub const FLUSH_WORDS: &'static [&'static str] = &["flush", "on", "activate"];
    pub const STOP_WORDS: &'static [&'static str] = &["off", "stop"];
    pub const STATUS_WORDS: &'static [&'static str] = &["status", "ping"];

    /// Case-sensitive match against the synonym sets.
    pub fn parse(word: &str) -> Self {
        if Self::FLUSH_WORDS.contains(&word) {
            Action::Flush
        } else if Self::STOP_WORDS.contains(&word) {
            Action::Stop
        } else if Self::STATUS_WORDS.contains(&word) {
            Action::StatusQuery
        } else {
            Action::Unknown
        }
    }

    /// Word used by nodes in the `action` field of their responses
    pub fn canonical(&self) -> &'static str {
        match self {
            Action::Flush => "flush",
            Action::Stop => "stop",
            Action::StatusQuery => "status",
            Action::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Action::Unknown)
    }
}

impl From<&str> for Action {
    fn from(word: &str) -> Self {
        Action::parse(word)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}
