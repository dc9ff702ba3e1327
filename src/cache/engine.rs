use super::entry::{NEVER_EXPIRE, unix_now};
use super::options::CacheOptions;
use super::segment::Segment;
use super::status::Status;
use crate::error::Result;

use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

/// Byte-string hash used for segment selection.
///
/// `idx = 31 * idx + byte`, then `idx ^ (idx >> 16)`, in wrapping signed
/// 64-bit arithmetic. Other implementations of the node shard with the same
/// formula, so it must stay bit-exact.
pub fn hash_key(key: &[u8]) -> i64 {
    let mut idx: i64 = 0;
    for &b in key {
        idx = idx.wrapping_mul(31).wrapping_add((b & 0xff) as i64);
    }
    idx ^ (idx >> 16)
}

/// Segment a key belongs to; `segment_count` must be a power of two.
pub fn segment_index(key: &[u8], segment_count: usize) -> usize {
    (hash_key(key) & (segment_count as i64 - 1)) as usize
}

/// The sharded in-memory store.
///
/// Every operation holds a shared permit of `freeze` for its whole duration;
/// a snapshot dump takes the exclusive permit so it observes a quiesced cache.
pub struct Cache {
    pub(super) segments: Box<[Segment]>,
    pub(super) options: CacheOptions,
    freeze: RwLock<()>,
}

impl Cache {
    /// Creates an empty cache.
    pub fn new(options: CacheOptions) -> Result<Self> {
        options.validate()?;
        let segments = (0..options.segment_count)
            .map(|_| Segment::new(&options))
            .collect();
        Ok(Self::from_parts(segments, options))
    }

    pub(super) fn from_parts(segments: Box<[Segment]>, options: CacheOptions) -> Self {
        Self {
            segments,
            options,
            freeze: RwLock::new(()),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn segment_of(&self, key: &[u8]) -> &Segment {
        &self.segments[segment_index(key, self.segments.len())]
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Vec<u8>> {
        self.get_at(key, unix_now())
    }

    pub(crate) fn get_at(&self, key: impl AsRef<[u8]>, now: i64) -> Option<Vec<u8>> {
        let key = key.as_ref();
        let _permit = self.freeze.read();
        self.segment_of(key).get(key, now)
    }

    /// Stores `value` without expiry.
    pub fn set(&self, key: impl AsRef<[u8]>, value: &[u8]) -> Result<()> {
        self.set_with_ttl(key, value, NEVER_EXPIRE)
    }

    /// Stores `value` with an idle timeout of `ttl` seconds (`0` never expires).
    pub fn set_with_ttl(&self, key: impl AsRef<[u8]>, value: &[u8], ttl: i64) -> Result<()> {
        self.set_at(key, value, ttl, unix_now())
    }

    pub(crate) fn set_at(
        &self,
        key: impl AsRef<[u8]>,
        value: &[u8],
        ttl: i64,
        now: i64,
    ) -> Result<()> {
        let key = key.as_ref();
        let _permit = self.freeze.read();
        self.segment_of(key).set(key, value, ttl, now)
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) {
        let key = key.as_ref();
        let _permit = self.freeze.read();
        self.segment_of(key).delete(key);
    }

    /// Sums the segment totals one segment at a time.
    ///
    /// Not a point-in-time view: writes racing the scan may be partially counted.
    pub fn status(&self) -> Status {
        let _permit = self.freeze.read();
        let mut total = Status::default();
        for segment in self.segments.iter() {
            total += segment.status();
        }
        total
    }

    pub(crate) fn gc_segment_at(&self, index: usize, now: i64) -> usize {
        let _permit = self.freeze.read();
        self.segments[index].gc(now)
    }

    /// Sweeps every segment concurrently and waits for all sweeps to finish.
    pub async fn gc(self: &Arc<Self>) -> usize {
        let now = unix_now();
        let mut sweeps = JoinSet::new();
        for index in 0..self.segments.len() {
            let cache = self.clone();
            sweeps.spawn_blocking(move || cache.gc_segment_at(index, now));
        }

        let mut evicted = 0;
        while let Some(result) = sweeps.join_next().await {
            match result {
                Ok(count) => evicted += count,
                Err(e) => tracing::error!("GC sweep task failed: {}", e),
            }
        }
        evicted
    }

    /// True while a snapshot dump holds the cache frozen.
    pub fn is_frozen(&self) -> bool {
        self.freeze.is_locked_exclusive()
    }

    pub(super) fn freeze(&self) -> RwLockWriteGuard<'_, ()> {
        self.freeze.write()
    }

    /// Runs a GC sweep every `gc_interval_minutes`.
    pub fn spawn_gc(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.options.gc_interval_minutes * 60);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                let evicted = self.gc().await;
                tracing::debug!("GC sweep evicted {} entries", evicted);
            }
        })
    }

    /// Writes a snapshot every `dump_interval_secs`. Failures are logged and
    /// the cache keeps serving from memory.
    pub fn spawn_dump(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.options.dump_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;
                let cache = self.clone();
                match tokio::task::spawn_blocking(move || cache.dump()).await {
                    Ok(Ok(())) => tracing::debug!("Snapshot written"),
                    Ok(Err(e)) => tracing::warn!("Snapshot dump failed: {}", e),
                    Err(e) => tracing::error!("Snapshot task failed: {}", e),
                }
            }
        })
    }
}
