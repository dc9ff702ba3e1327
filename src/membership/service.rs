use anyhow::Result;
use dashmap::DashMap;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::info;

use super::types::{GossipMessage, Node, NodeState};
use crate::routing::MembershipProvider;

/// Intervals and timeouts of the failure detector.
#[derive(Debug, Clone, Copy)]
pub struct GossipTimings {
    pub gossip_interval: Duration,
    pub failure_check_interval: Duration,
    pub suspect_timeout: Duration,
    pub dead_timeout: Duration,
}

impl Default for GossipTimings {
    fn default() -> Self {
        Self {
            gossip_interval: Duration::from_millis(500),
            failure_check_interval: Duration::from_secs(2),
            suspect_timeout: Duration::from_secs(5),
            dead_timeout: Duration::from_secs(10),
        }
    }
}

pub struct GossipMembership {
    pub local_node: Node,
    pub members: Arc<DashMap<String, Node>>,
    socket: Arc<UdpSocket>,
    incarnation: AtomicU64,
    timings: GossipTimings,
}

impl GossipMembership {
    /// Binds the gossip socket and announces `address` to every seed.
    pub async fn new(
        address: impl Into<String>,
        gossip_bind: SocketAddr,
        seeds: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        Self::with_timings(address, gossip_bind, seeds, GossipTimings::default()).await
    }

    pub async fn with_timings(
        address: impl Into<String>,
        gossip_bind: SocketAddr,
        seeds: Vec<SocketAddr>,
        timings: GossipTimings,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(gossip_bind).await?;
        // Port 0 resolves here, so peers learn the real gossip port.
        let local_node = Node::new(address, socket.local_addr()?);

        let members = Arc::new(DashMap::new());
        members.insert(local_node.address.clone(), local_node.clone());

        let service = Arc::new(Self {
            incarnation: AtomicU64::new(local_node.incarnation),
            local_node,
            members,
            socket: Arc::new(socket),
            timings,
        });
        service.join(&seeds).await?;
        Ok(service)
    }

    /// Sends a join request to each seed other than this node.
    pub async fn join(&self, seeds: &[SocketAddr]) -> Result<()> {
        let seeds: Vec<&SocketAddr> = seeds
            .iter()
            .filter(|seed| **seed != self.local_node.gossip_addr)
            .collect();
        if seeds.is_empty() {
            info!("Starting as the first member of a new cluster");
            return Ok(());
        }

        info!("Joining cluster via {} seed node(s)", seeds.len());
        let encoded = bincode::serialize(&GossipMessage::Join {
            node: self.current_local_node(),
        })?;
        for seed in seeds {
            self.socket.send_to(&encoded, seed).await?;
            info!("Sent join request to {}", seed);
        }
        Ok(())
    }

    /// Spawns the gossip, receive and failure-detection loops.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        tracing::info!("Starting membership service on {}", self.local_node.gossip_addr);

        vec![
            tokio::spawn(self.clone().gossip_loop()),
            tokio::spawn(self.clone().receive_loop()),
            tokio::spawn(self.failure_detection_loop()),
        ]
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get_member(&self, address: &str) -> Option<Node> {
        self.members.get(address).map(|entry| entry.value().clone())
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation.load(Ordering::SeqCst)
    }

    fn current_local_node(&self) -> Node {
        let mut node = self.local_node.clone();
        node.incarnation = self.incarnation();
        node
    }

    fn is_local(&self, address: &str) -> bool {
        address == self.local_node.address
    }

    async fn gossip_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.timings.gossip_interval);

        loop {
            interval.tick().await;

            let targets: Vec<SocketAddr> = self
                .members
                .iter()
                .filter(|entry| {
                    !self.is_local(entry.key()) && entry.value().state != NodeState::Dead
                })
                .map(|entry| entry.value().gossip_addr)
                .collect();

            if targets.is_empty() {
                continue;
            }

            let target = targets[rand::thread_rng().gen_range(0..targets.len())];
            let msg = GossipMessage::Ping {
                from: self.local_node.address.clone(),
                incarnation: self.incarnation(),
            };

            match bincode::serialize(&msg) {
                Ok(encoded) => {
                    if let Err(e) = self.socket.send_to(&encoded, target).await {
                        tracing::warn!("Failed to send ping to {}: {}", target, e);
                    } else {
                        tracing::debug!("Sent ping to {}", target);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize ping: {}", e),
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<GossipMessage>(&buf[..len]) {
                    Ok(msg) => {
                        if let Err(e) = self.handle_message(msg, src).await {
                            tracing::error!("Error handling message from {}: {}", src, e);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize message from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    pub(crate) async fn handle_message(&self, msg: GossipMessage, src: SocketAddr) -> Result<()> {
        match msg {
            GossipMessage::Join { node } => self.handle_join(node, src).await,
            GossipMessage::Ping { from, incarnation } => {
                self.handle_ping(from, incarnation, src).await
            }
            GossipMessage::Ack {
                from,
                incarnation,
                members,
            } => {
                self.handle_ack(from, incarnation, members).await;
                Ok(())
            }
            GossipMessage::Suspect {
                address,
                incarnation,
            } => {
                self.handle_suspect(address, incarnation).await;
                Ok(())
            }
            GossipMessage::Alive {
                address,
                incarnation,
            } => {
                self.handle_alive(address, incarnation);
                Ok(())
            }
        }
    }

    async fn handle_join(&self, mut node: Node, src: SocketAddr) -> Result<()> {
        tracing::info!("Node {} joining cluster (gossip {})", node.address, src);

        node.gossip_addr = src;
        node.state = NodeState::Alive;
        node.last_seen = Some(Instant::now());
        self.members.insert(node.address.clone(), node);
        tracing::info!("Cluster size now: {}", self.members.len());

        // Answer with the member table so the joiner learns the cluster at once.
        self.send_ack(src).await
    }

    async fn handle_ping(&self, from: String, incarnation: u64, src: SocketAddr) -> Result<()> {
        tracing::debug!("Received ping from {}", from);

        match self.members.get_mut(&from) {
            Some(mut member) => {
                member.last_seen = Some(Instant::now());
                member.gossip_addr = src;
                if incarnation > member.incarnation {
                    member.incarnation = incarnation;
                }
                if member.state != NodeState::Alive && incarnation >= member.incarnation {
                    tracing::info!("Node {} is reachable again", from);
                    member.state = NodeState::Alive;
                }
            }
            None => {
                tracing::info!("Discovered new member via ping: {} at {}", from, src);
                let mut node = Node::new(from.clone(), src);
                node.incarnation = incarnation;
                self.members.insert(from, node);
            }
        }

        self.send_ack(src).await
    }

    async fn send_ack(&self, target: SocketAddr) -> Result<()> {
        let members: Vec<Node> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let reply = GossipMessage::Ack {
            from: self.local_node.address.clone(),
            incarnation: self.incarnation(),
            members,
        };

        let encoded = bincode::serialize(&reply)?;
        self.socket.send_to(&encoded, target).await?;
        tracing::debug!("Sent ack to {} with {} members", target, self.members.len());
        Ok(())
    }

    async fn handle_ack(&self, from: String, incarnation: u64, members: Vec<Node>) {
        tracing::debug!(
            "Received ack from {} (inc={}) with {} members",
            from,
            incarnation,
            members.len()
        );

        if let Some(mut member) = self.members.get_mut(&from) {
            member.last_seen = Some(Instant::now());
            if incarnation > member.incarnation {
                member.incarnation = incarnation;
                member.state = NodeState::Alive;
            }
        }

        for member in members {
            self.merge_member(member).await;
        }
    }

    async fn merge_member(&self, reported: Node) {
        if self.is_local(&reported.address) {
            if reported.state != NodeState::Alive {
                self.refute(reported.incarnation).await;
            }
            return;
        }

        match self.members.get_mut(&reported.address) {
            Some(mut existing) => {
                if reported.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {}",
                        reported.address,
                        existing.incarnation,
                        reported.incarnation,
                    );
                    existing.state = reported.state;
                    existing.incarnation = reported.incarnation;
                    existing.last_seen = Some(Instant::now());
                } else if reported.incarnation == existing.incarnation
                    && reported.state == NodeState::Alive
                    && existing.state == NodeState::Suspect
                {
                    tracing::info!("{} refuted suspicion", reported.address);
                    existing.state = NodeState::Alive;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => {
                if reported.state == NodeState::Dead {
                    return;
                }
                tracing::info!(
                    "Discovered new member: {} at {}",
                    reported.address,
                    reported.gossip_addr
                );
                let mut node = reported;
                node.last_seen = Some(Instant::now());
                self.members.insert(node.address.clone(), node);
            }
        }
    }

    async fn handle_suspect(&self, address: String, incarnation: u64) {
        if self.is_local(&address) {
            self.refute(incarnation).await;
            return;
        }

        match self.members.get_mut(&address) {
            Some(mut existing) => {
                if incarnation >= existing.incarnation && existing.state == NodeState::Alive {
                    tracing::info!("Node {} suspected", address);
                    existing.state = NodeState::Suspect;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => tracing::debug!("Suspected node {} is unknown", address),
        }
    }

    /// Answers a suspicion about this node with a higher incarnation.
    async fn refute(&self, suspected_incarnation: u64) {
        let current = self.incarnation();
        if suspected_incarnation < current {
            return;
        }
        let incarnation = suspected_incarnation + 1;
        self.incarnation.store(incarnation, Ordering::SeqCst);
        if let Some(mut local) = self.members.get_mut(&self.local_node.address) {
            local.incarnation = incarnation;
            local.state = NodeState::Alive;
        }

        tracing::info!("Refuting suspicion with incarnation {}", incarnation);
        self.broadcast_message(GossipMessage::Alive {
            address: self.local_node.address.clone(),
            incarnation,
        })
        .await;
    }

    fn handle_alive(&self, address: String, incarnation: u64) {
        match self.members.get_mut(&address) {
            Some(mut existing) => {
                if incarnation > existing.incarnation
                    || (incarnation == existing.incarnation
                        && existing.state == NodeState::Suspect)
                {
                    tracing::info!("Node {} is alive (inc={})", address, incarnation);
                    existing.state = NodeState::Alive;
                    existing.incarnation = incarnation;
                    existing.last_seen = Some(Instant::now());
                }
            }
            None => tracing::debug!("Alive message for unknown node {}", address),
        }
    }

    /// One pass of the failure detector. Returns the suspicions to spread.
    pub(crate) fn detect_failures(&self, now: Instant) -> Vec<GossipMessage> {
        let mut suspicions = Vec::new();

        for mut entry in self.members.iter_mut() {
            if self.is_local(entry.key()) {
                continue;
            }
            let member = entry.value_mut();
            let Some(last_seen) = member.last_seen else {
                member.last_seen = Some(now);
                continue;
            };
            let elapsed = now.saturating_duration_since(last_seen);

            match member.state {
                NodeState::Alive if elapsed > self.timings.suspect_timeout => {
                    tracing::warn!(
                        "Node {} suspected (no contact for {:?})",
                        member.address,
                        elapsed
                    );
                    member.state = NodeState::Suspect;
                    suspicions.push(GossipMessage::Suspect {
                        address: member.address.clone(),
                        incarnation: member.incarnation,
                    });
                }
                NodeState::Suspect if elapsed > self.timings.dead_timeout => {
                    tracing::info!(
                        "Node {} declared dead (no contact for {:?})",
                        member.address,
                        elapsed
                    );
                    member.state = NodeState::Dead;
                }
                _ => {}
            }
        }

        suspicions
    }

    async fn failure_detection_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.timings.failure_check_interval);

        loop {
            interval.tick().await;
            for msg in self.detect_failures(Instant::now()) {
                self.broadcast_message(msg).await;
            }
        }
    }

    async fn broadcast_message(&self, msg: GossipMessage) {
        let encoded = match bincode::serialize(&msg) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to serialize broadcast: {}", e);
                return;
            }
        };

        // Collect first: no map guard may be held across a send.
        let targets: Vec<(String, SocketAddr)> = self
            .members
            .iter()
            .filter(|entry| !self.is_local(entry.key()) && entry.value().state == NodeState::Alive)
            .map(|entry| (entry.key().clone(), entry.value().gossip_addr))
            .collect();

        for (address, gossip_addr) in targets {
            if let Err(e) = self.socket.send_to(&encoded, gossip_addr).await {
                tracing::warn!("Failed to broadcast to {}: {}", address, e);
            }
        }
    }
}

impl MembershipProvider for GossipMembership {
    fn members(&self) -> Vec<String> {
        self.get_alive_members()
            .into_iter()
            .map(|node| node.address)
            .collect()
    }
}
