//! Node identifiers and the messages exchanged between clients and servers.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Address of a message endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Client(ClientId),
    Server(ServerId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Client(id) => id.fmt(f),
            NodeId::Server(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Request for `num_msgs_to_recv` data messages
    Get { num_msgs_to_recv: u32 },
    Data,
}

/// A message in flight. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub kind: MessageKind,
    pub source: NodeId,
    pub destination: NodeId,
}

/// Hands out unique message ids within one replica
#[derive(Debug, Default)]
pub struct MessageFactory {
    next_id: u64,
}

impl MessageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, kind: MessageKind, source: NodeId, destination: NodeId) -> Message {
        let id = self.next_id;
        self.next_id += 1;
        Message {
            id,
            kind,
            source,
            destination,
        }
    }
}
