use super::ring::HashRing;
use crate::error::{Error, Result};

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Source of the current cluster member list (canonical cache addresses).
pub trait MembershipProvider: Send + Sync {
    fn members(&self) -> Vec<String>;
}

/// A fixed member list.
#[derive(Debug, Clone, Default)]
pub struct StaticMembership {
    members: Vec<String>,
}

impl StaticMembership {
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

impl MembershipProvider for StaticMembership {
    fn members(&self) -> Vec<String> {
        self.members.clone()
    }
}

/// Decides which node owns a key.
///
/// The ring is rebuilt from the membership provider and published as a new
/// snapshot; lookups load the current snapshot without locking.
pub struct Router {
    ring: ArcSwap<HashRing>,
    replicas: usize,
    self_address: String,
    membership: Arc<dyn MembershipProvider>,
}

impl Router {
    /// Creates a router and builds its first ring.
    pub fn new(
        self_address: impl Into<String>,
        replicas: usize,
        membership: Arc<dyn MembershipProvider>,
    ) -> Arc<Self> {
        let router = Arc::new(Self {
            ring: ArcSwap::from_pointee(HashRing::empty(replicas)),
            replicas,
            self_address: self_address.into(),
            membership,
        });
        router.refresh();
        router
    }

    /// Rebuilds the ring from the membership provider.
    pub fn refresh(&self) {
        let members = self.membership.members();
        self.set_members(members);
    }

    /// Replaces the ring with one built over `members`.
    pub fn set_members(&self, members: Vec<String>) {
        let ring = HashRing::build(members, self.replicas);
        if ring.members() != self.ring.load().members() {
            tracing::info!("Ring rebuilt with {} members: {:?}", ring.len(), ring.members());
        }
        self.ring.store(Arc::new(ring));
    }

    pub fn owner(&self, key: impl AsRef<[u8]>) -> Result<String> {
        self.ring
            .load()
            .get(key)
            .map(str::to_string)
            .ok_or(Error::NoAvailableNode)
    }

    /// True if `owner` is this node's canonical address.
    pub fn is_self(&self, owner: &str) -> bool {
        owner == self.self_address
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Members of the current ring, sorted.
    pub fn members(&self) -> Vec<String> {
        self.ring.load().members().to_vec()
    }

    /// Member list as the membership provider reports it right now.
    pub fn live_members(&self) -> Vec<String> {
        let mut members = self.membership.members();
        members.sort();
        members.dedup();
        members
    }

    /// Current ring snapshot.
    pub fn ring(&self) -> Arc<HashRing> {
        self.ring.load_full()
    }

    /// Rebuilds the ring every `interval`.
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the ring was built in `new`.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.refresh();
            }
        })
    }
}
