use super::entry::Entry;
use super::options::CacheOptions;
use super::status::Status;
use crate::error::{Error, Result};

use parking_lot::RwLock;
use std::collections::HashMap;

/// Map and running totals guarded together by the segment lock.
#[derive(Debug, Default)]
pub(crate) struct SegmentData {
    pub entries: HashMap<Vec<u8>, Entry>,
    pub status: Status,
}

/// One independently locked shard of the key space.
#[derive(Debug)]
pub(crate) struct Segment {
    data: RwLock<SegmentData>,
    budget: i64,
    max_gc_count: usize,
}

impl Segment {
    pub fn new(options: &CacheOptions) -> Self {
        Self::with_data(
            SegmentData {
                entries: HashMap::with_capacity(options.map_size_of_segment),
                status: Status::default(),
            },
            options,
        )
    }

    pub fn with_data(data: SegmentData, options: &CacheOptions) -> Self {
        Self {
            data: RwLock::new(data),
            budget: options.segment_budget(),
            max_gc_count: options.max_gc_count,
        }
    }

    pub fn get(&self, key: &[u8], now: i64) -> Option<Vec<u8>> {
        {
            let data = self.data.read();
            match data.entries.get(key) {
                None => return None,
                Some(entry) if entry.is_alive(now) => return Some(entry.touch(now)),
                Some(_) => {}
            }
        }

        // Dead on read: evict under the exclusive lock. The entry may have been
        // replaced in between, so liveness is checked again.
        let mut guard = self.data.write();
        let SegmentData { entries, status } = &mut *guard;
        match entries.get(key) {
            Some(entry) if entry.is_alive(now) => Some(entry.touch(now)),
            Some(_) => {
                if let Some(dead) = entries.remove(key) {
                    status.sub_entry(key, dead.data());
                }
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &[u8], value: &[u8], ttl: i64, now: i64) -> Result<()> {
        let mut guard = self.data.write();
        let SegmentData { entries, status } = &mut *guard;

        let mut projected = *status;
        if let Some(old) = entries.get(key) {
            projected.sub_entry(key, old.data());
        }
        projected.add_entry(key, value);

        if projected.entry_size() > self.budget {
            return Err(Error::CapacityExceeded);
        }

        *status = projected;
        entries.insert(key.to_vec(), Entry::new(value, ttl, now));
        Ok(())
    }

    /// Returns whether an entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut guard = self.data.write();
        let SegmentData { entries, status } = &mut *guard;
        match entries.remove(key) {
            Some(old) => {
                status.sub_entry(key, old.data());
                true
            }
            None => false,
        }
    }

    pub fn status(&self) -> Status {
        self.data.read().status
    }

    /// Evicts dead entries, at most `max_gc_count` of them. Returns the number evicted.
    pub fn gc(&self, now: i64) -> usize {
        let mut guard = self.data.write();
        let SegmentData { entries, status } = &mut *guard;

        let dead = dead_keys(entries.iter(), now, self.max_gc_count);
        for key in &dead {
            if let Some(entry) = entries.remove(key.as_slice()) {
                status.sub_entry(key, entry.data());
            }
        }
        dead.len()
    }

    /// Runs `f` against the locked contents. Used by the snapshot writer.
    pub fn with_data_read<T>(&self, f: impl FnOnce(&SegmentData) -> T) -> T {
        f(&self.data.read())
    }
}

/// Up to `limit` keys of dead entries. The scan stops as soon as the limit is
/// reached, which bounds how long a sweep holds the segment lock.
pub(crate) fn dead_keys<'a, I>(entries: I, now: i64, limit: usize) -> Vec<Vec<u8>>
where
    I: IntoIterator<Item = (&'a Vec<u8>, &'a Entry)>,
{
    entries
        .into_iter()
        .filter(|(_, entry)| !entry.is_alive(now))
        .map(|(key, _)| key.clone())
        .take(limit)
        .collect()
}
