//! Topic and role primitives
//!
//! A topic is an opaque, case-sensitive, non-empty string. Roles are matched
//! case-insensitively on the wire but are fixed once a connection is registered.

use std::fmt;
use std::str::FromStr;

use crate::utils::error::HandshakeError;

/// Identifies one accepted connection. Assigned from a monotonically
/// increasing counter, so ordering ids gives registration order.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "PUBLISHER",
            Role::Subscriber => "SUBSCRIBER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HandshakeError;

    /// Case-insensitive; no trimming, so `"publisher "` is not a role.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("PUBLISHER") {
            Ok(Role::Publisher)
        } else if s.eq_ignore_ascii_case("SUBSCRIBER") {
            Ok(Role::Subscriber)
        } else {
            Err(HandshakeError::UnknownRole(s.to_string()))
        }
    }
}
