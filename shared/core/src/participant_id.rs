use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::SocketAddr;

/// Opaque identifier of a connected participant.
///
/// The coordinator derives it from the transport peer address; nothing in the
/// core ever looks inside the string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for ParticipantId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
