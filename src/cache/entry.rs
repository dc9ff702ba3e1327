use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// TTL value for entries that never expire.
pub const NEVER_EXPIRE: i64 = 0;

/// A stored value with its idle timeout.
///
/// `last_touch` is refreshed by every successful read, so `ttl` measures
/// inactivity rather than age. It is atomic because reads only hold the
/// segment's shared lock.
#[derive(Debug)]
pub struct Entry {
    data: Vec<u8>,
    ttl: i64,
    last_touch: AtomicI64,
}

impl Entry {
    pub fn new(data: &[u8], ttl: i64, now: i64) -> Self {
        Self::restored(data.to_vec(), ttl, now)
    }

    pub(crate) fn restored(data: Vec<u8>, ttl: i64, last_touch: i64) -> Self {
        Self {
            data,
            ttl,
            last_touch: AtomicI64::new(last_touch),
        }
    }

    pub fn is_alive(&self, now: i64) -> bool {
        self.ttl == NEVER_EXPIRE || self.ttl > now - self.last_touch.load(Ordering::Acquire)
    }

    /// Marks the entry as used at `now` and returns a copy of its value.
    pub fn touch(&self, now: i64) -> Vec<u8> {
        self.last_touch.store(now, Ordering::Release);
        self.data.clone()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn ttl(&self) -> i64 {
        self.ttl
    }

    pub fn last_touch(&self) -> i64 {
        self.last_touch.load(Ordering::Acquire)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
