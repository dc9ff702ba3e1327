//! Membership & Discovery Module
//!
//! A gossip membership protocol (inspired by SWIM) that tells each node which
//! cache nodes currently form the cluster. Its alive member list feeds the
//! routing ring.
//!
//! ## Core Mechanisms
//! - **Gossip Protocol**: Nodes periodically ping a random peer over UDP; the ack carries the peer's member table.
//! - **Failure Detection**: Silent members move from "Suspect" to "Dead" after timeouts.
//! - **Incarnation Numbers**: A suspected member refutes the claim by raising its own incarnation.

pub mod service;
pub mod types;

pub use service::{GossipMembership, GossipTimings};
pub use types::{GossipMessage, Node, NodeState};

#[cfg(test)]
mod tests;
