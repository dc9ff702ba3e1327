use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Entry count and byte totals of a segment or of the whole cache.
///
/// Kept incrementally on every mutation; never recomputed by scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub count: i64,
    pub key_size: i64,
    pub value_size: i64,
}

impl Status {
    pub fn add_entry(&mut self, key: &[u8], value: &[u8]) {
        self.count += 1;
        self.key_size += key.len() as i64;
        self.value_size += value.len() as i64;
    }

    pub fn sub_entry(&mut self, key: &[u8], value: &[u8]) {
        self.count -= 1;
        self.key_size -= key.len() as i64;
        self.value_size -= value.len() as i64;
    }

    /// Bytes charged against the capacity budget.
    pub fn entry_size(&self) -> i64 {
        self.key_size + self.value_size
    }
}

impl AddAssign for Status {
    fn add_assign(&mut self, other: Self) {
        self.count += other.count;
        self.key_size += other.key_size;
        self.value_size += other.value_size;
    }
}
