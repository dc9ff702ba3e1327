use crate::cache::{Cache, Status};
use crate::error::{Error, Result};
use crate::routing::Router;

use std::sync::Arc;
use std::time::Duration;

/// Applies cache requests on the node that owns the key.
///
/// Shared by the TCP and HTTP surfaces. A key owned by another node is
/// answered with [`Error::RedirectRequired`] naming that node.
pub struct CacheService {
    cache: Arc<Cache>,
    router: Arc<Router>,
    freeze_poll: Duration,
}

impl CacheService {
    pub fn new(cache: Arc<Cache>, router: Arc<Router>, freeze_poll: Duration) -> Arc<Self> {
        Arc::new(Self {
            cache,
            router,
            freeze_poll,
        })
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Fails with a redirect unless this node owns `key`.
    pub fn check_owner(&self, key: &[u8]) -> Result<()> {
        let owner = self.router.owner(key)?;
        if !self.router.is_self(&owner) {
            tracing::debug!("Key {} belongs to {}", String::from_utf8_lossy(key), owner);
            return Err(Error::RedirectRequired { owner });
        }
        Ok(())
    }

    /// Yields to the runtime while a snapshot dump holds the cache frozen,
    /// so connection tasks do not park runtime workers on the gate.
    async fn wait_unfrozen(&self) {
        while self.cache.is_frozen() {
            tokio::time::sleep(self.freeze_poll).await;
        }
    }

    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        let key = key.as_ref();
        self.check_owner(key)?;
        self.wait_unfrozen().await;
        Ok(self.cache.get(key))
    }

    pub async fn set(&self, key: impl AsRef<[u8]>, value: &[u8], ttl: i64) -> Result<()> {
        let key = key.as_ref();
        self.check_owner(key)?;
        self.wait_unfrozen().await;
        self.cache.set_with_ttl(key, value, ttl)
    }

    pub async fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        let key = key.as_ref();
        self.check_owner(key)?;
        self.wait_unfrozen().await;
        self.cache.delete(key);
        Ok(())
    }

    pub async fn status(&self) -> Status {
        self.wait_unfrozen().await;
        self.cache.status()
    }

    pub fn nodes(&self) -> Vec<String> {
        self.router.live_members()
    }
}
