//! The envelope written to subscribers for every delivered publish:
//! `[<topic>] Publisher <sender>: <message>` followed by a newline.
//!
//! The sender is the publisher's remote address in `ip:port` form, e.g.
//! `127.0.0.1:54321`, with no leading `/`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub topic: &'a str,
    pub sender: &'a str,
    pub payload: &'a str,
}

impl<'a> Envelope<'a> {
    pub fn new(topic: &'a str, sender: &'a str, payload: &'a str) -> Self {
        Self {
            topic,
            sender,
            payload,
        }
    }

    /// The envelope as a single newline-terminated wire line.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Envelope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Publisher {}: {}",
            self.topic, self.sender, self.payload
        )
    }
}
