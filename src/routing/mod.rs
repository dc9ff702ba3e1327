//! Consistent-Hash Routing
//!
//! Maps keys to the node that owns them. Every node occupies many virtual
//! positions on a CRC-32 ring; a key belongs to the first position strictly
//! after its own hash. Nodes that receive a key they do not own answer with
//! a redirect naming the owner.

pub mod redirect;
pub mod ring;
pub mod router;

pub use redirect::{REDIRECT_PREFIX, parse_redirect, redirect_message};
pub use ring::{DEFAULT_VIRTUAL_REPLICAS, HashRing};
pub use router::{MembershipProvider, Router, StaticMembership};

#[cfg(test)]
mod tests;
