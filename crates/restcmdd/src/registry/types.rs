//! Registration records exchanged with the registry.

use serde::{Deserialize, Serialize};

/// Direction of traffic over an announced connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
    Bidirectional,
}

/// Connection announced after a successful bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRegistration {
    pub uid: String,
    pub data_type: String,
    pub uri: String,
    pub direction: Direction,
}

impl ConnectionRegistration {
    /// Identity used to retract this registration.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        ConnectionId {
            uid: self.uid.clone(),
            data_type: self.data_type.clone(),
        }
    }
}

/// Identity of an announced connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionId {
    pub uid: String,
    pub data_type: String,
}
