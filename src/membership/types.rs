use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// A single cluster member.
///
/// A member is identified by `address`, the canonical address its cache
/// listener is reachable on; that is the string the routing ring is built
/// from. `gossip_addr` is where its membership socket listens. The
/// `incarnation` orders conflicting reports about the same member: only the
/// member itself raises it, to refute a suspicion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub address: String,
    pub gossip_addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,

    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl Node {
    pub fn new(address: impl Into<String>, gossip_addr: SocketAddr) -> Self {
        Self {
            address: address.into(),
            gossip_addr,
            state: NodeState::Alive,
            incarnation: 1,
            last_seen: Some(Instant::now()),
        }
    }
}

/// Datagrams exchanged between membership services.
///
/// - `Join`: a new member announces itself to a seed, which answers with `Ack`.
/// - `Ping/Ack`: liveness probe; the ack carries the sender's member table.
/// - `Suspect/Alive`: spread a change in a member's health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GossipMessage {
    Join {
        node: Node,
    },

    Ping {
        from: String,
        incarnation: u64,
    },

    Ack {
        from: String,
        incarnation: u64,
        members: Vec<Node>,
    },

    Suspect {
        address: String,
        incarnation: u64,
    },

    Alive {
        address: String,
        incarnation: u64,
    },
}
