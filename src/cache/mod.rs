//! Sharded Cache Engine
//!
//! A node-local key-value store split into a power-of-two number of segments,
//! each guarded by its own reader/writer lock.
//!
//! ## Core Concepts
//! - **Sharding**: `segment_index` hashes a key with a fixed string hash and masks
//!   it with `segment_count - 1`.
//! - **Sliding expiry**: every read refreshes an entry's last-touch time, so the TTL
//!   is an idle timeout. Dead entries are evicted lazily on read and by bounded GC sweeps.
//! - **Capacity**: each segment has a byte budget; a write that would exceed it is
//!   rejected without touching the segment.
//! - **Snapshots**: `dump` freezes all operations, writes the full state to disk and
//!   `open` restores it on start-up.

pub mod engine;
pub mod entry;
pub mod options;
mod segment;
pub mod snapshot;
pub mod status;

pub use engine::{Cache, hash_key, segment_index};
pub use entry::NEVER_EXPIRE;
pub use options::CacheOptions;
pub use status::Status;
