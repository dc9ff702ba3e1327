use crate::cache::Status;
use crate::error::{Error, Result};
use crate::routing::{DEFAULT_VIRTUAL_REPLICAS, HashRing};
use crate::rpc::client::set_args;
use crate::rpc::{Command, RpcClient};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Must match the servers' setting for the client ring to agree with theirs.
    pub virtual_replicas: usize,
    pub max_redirects: usize,
    /// Pooled connections unused for longer than this are replaced.
    pub idle_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            virtual_replicas: DEFAULT_VIRTUAL_REPLICAS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

struct PooledConnection {
    client: RpcClient,
    last_used: Instant,
}

type Slot = Arc<Mutex<PooledConnection>>;

/// A client for a whole cluster.
///
/// Keeps its own copy of the ring so most requests go straight to the owner,
/// holds one connection per node and follows redirects when its ring is
/// behind the cluster's.
pub struct ClusterClient {
    seed: String,
    ring: ArcSwap<HashRing>,
    connections: DashMap<String, Slot>,
    options: ClientOptions,
}

impl ClusterClient {
    pub async fn connect(seed: &str) -> Result<Self> {
        Self::connect_with(seed, ClientOptions::default()).await
    }

    /// Connects through `seed` and loads the member list from it.
    pub async fn connect_with(seed: &str, options: ClientOptions) -> Result<Self> {
        let client = Self {
            seed: seed.to_string(),
            ring: ArcSwap::from_pointee(HashRing::build([seed], options.virtual_replicas)),
            connections: DashMap::new(),
            options,
        };
        client.refresh().await?;
        Ok(client)
    }

    /// Members of the client's ring, sorted.
    pub fn members(&self) -> Vec<String> {
        self.ring.load().members().to_vec()
    }

    /// Re-reads the member list and rebuilds the ring.
    pub async fn refresh(&self) -> Result<()> {
        let members = self.nodes().await?;
        tracing::debug!("Client ring refreshed with {} members", members.len());
        self.ring
            .store(Arc::new(HashRing::build(members, self.options.virtual_replicas)));
        Ok(())
    }

    /// Re-reads the member list every `interval` until the client is dropped.
    /// Failed refreshes are logged and the previous ring stays in use.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(client) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = client.refresh().await {
                    tracing::warn!("Periodic ring refresh failed: {}", e);
                }
            }
        })
    }

    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        match self.routed(key, Command::Get, vec![key.to_vec()]).await {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set(&self, key: impl AsRef<[u8]>, value: &[u8], ttl: i64) -> Result<()> {
        let key = key.as_ref();
        self.routed(key, Command::Set, set_args(key, value, ttl))
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        self.routed(key, Command::Delete, vec![key.to_vec()])
            .await
            .map(|_| ())
    }

    /// Sum of every member's status.
    pub async fn status(&self) -> Result<Status> {
        let mut total = Status::default();
        for member in self.members() {
            let body = self.call(&member, Command::Status, Vec::new()).await?;
            total += serde_json::from_slice::<Status>(&body)?;
        }
        Ok(total)
    }

    /// Member list as reported by the first reachable node.
    pub async fn nodes(&self) -> Result<Vec<String>> {
        let mut candidates = self.members();
        if !candidates.contains(&self.seed) {
            candidates.push(self.seed.clone());
        }

        for candidate in candidates {
            match self.call(&candidate, Command::Nodes, Vec::new()).await {
                Ok(body) => return Ok(serde_json::from_slice(&body)?),
                Err(e) => tracing::debug!("Node {} did not answer Nodes: {}", candidate, e),
            }
        }
        Err(Error::NoAvailableNode)
    }

    /// Drops every pooled connection.
    pub fn close(&self) {
        self.connections.clear();
    }

    /// Sends a keyed request to its owner, following redirects.
    async fn routed(&self, key: &[u8], command: Command, args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        let mut target = self.owner(key)?;
        let mut retries = 0;

        loop {
            let err = match self.call(&target, command, args.clone()).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if retries == self.options.max_redirects {
                return Err(match err {
                    Error::RedirectRequired { .. } => {
                        Error::MaxRedirectsExceeded(self.options.max_redirects)
                    }
                    other => other,
                });
            }
            retries += 1;

            match err {
                Error::RedirectRequired { owner } => {
                    tracing::debug!(
                        "Key {} redirected from {} to {}",
                        String::from_utf8_lossy(key),
                        target,
                        owner
                    );
                    target = owner;
                }
                e if e.is_connection_error() => {
                    tracing::warn!("Connection to {} failed: {}", target, e);
                    if let Err(refresh_err) = self.refresh().await {
                        tracing::warn!("Ring refresh failed: {}", refresh_err);
                    }
                    target = self.owner(key)?;
                }
                e => return Err(e),
            }
        }
    }

    fn owner(&self, key: &[u8]) -> Result<String> {
        self.ring
            .load()
            .get(key)
            .map(str::to_string)
            .ok_or(Error::NoAvailableNode)
    }

    async fn call(&self, address: &str, command: Command, args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        let slot = self.slot(address).await?;
        let mut conn = slot.lock().await;

        if conn.last_used.elapsed() > self.options.idle_timeout {
            tracing::debug!("Replacing idle connection to {}", address);
            conn.client = RpcClient::connect(address).await?;
        }

        let result = conn.client.call(command.code(), args).await;
        conn.last_used = Instant::now();
        drop(conn);

        if let Err(e) = &result
            && e.is_connection_error()
        {
            self.connections.remove(address);
        }
        result
    }

    async fn slot(&self, address: &str) -> Result<Slot> {
        if let Some(slot) = self.connections.get(address) {
            return Ok(slot.value().clone());
        }

        let client = RpcClient::connect(address).await?;
        let slot = Arc::new(Mutex::new(PooledConnection {
            client,
            last_used: Instant::now(),
        }));
        // Another task may have connected meanwhile; keep whichever landed first.
        Ok(self
            .connections
            .entry(address.to_string())
            .or_insert(slot)
            .value()
            .clone())
    }
}
