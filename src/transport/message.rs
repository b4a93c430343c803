//! Wire protocol helpers
//!
//! The first line of a connection is the handshake `ROLE:TOPIC`. The role is
//! matched case-insensitively; the topic is everything after the first `:`,
//! trimmed, so topics may themselves contain colons. Topic case is preserved.
//! After the handshake, a line equal to `terminate` (case-insensitive,
//! surrounding whitespace ignored) ends the session.

use std::fmt;

use crate::broker::topic::Role;
use crate::utils::error::HandshakeError;

pub const TERMINATE: &str = "terminate";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub role: Role,
    pub topic: String,
}

impl Handshake {
    pub fn new(role: Role, topic: &str) -> Result<Self, HandshakeError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(HandshakeError::EmptyTopic);
        }
        Ok(Self {
            role,
            topic: topic.to_string(),
        })
    }

    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let line = line.trim();
        let (role, topic) = line
            .split_once(':')
            .ok_or_else(|| HandshakeError::MissingSeparator(line.to_string()))?;
        Self::new(role.parse()?, topic)
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.topic)
    }
}

/// Decodes one framed line. Invalid UTF-8 is replaced rather than rejected,
/// and a trailing `\r` is dropped.
pub fn decode_line(frame: &[u8]) -> String {
    let frame = frame.strip_suffix(b"\r").unwrap_or(frame);
    String::from_utf8_lossy(frame).into_owned()
}

pub fn is_terminate(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(TERMINATE)
}
