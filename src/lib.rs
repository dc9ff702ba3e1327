//! Distributed Sharded Cache Library
//!
//! This library crate defines the modules that make up a cache node and its
//! clients. It serves as the foundation for the `cache-node` binary (`main.rs`).
//!
//! ## Architecture Modules
//! - **`cache`**: The node-local engine. A segmented in-memory map with sliding TTLs,
//!   per-segment capacity budgets, bounded GC sweeps and snapshot persistence.
//! - **`rpc`**: The binary request/response protocol, its connection-per-task server and
//!   its clients (single connection and queue-multiplexed).
//! - **`routing`**: The consistent-hash ring that assigns keys to nodes, and the redirect
//!   convention used when a request reaches the wrong node.
//! - **`membership`**: UDP gossip (SWIM-like) discovery and failure detection feeding the ring.
//! - **`services`**: Request handlers joining router and engine, exposed over TCP and HTTP.
//! - **`client`**: A cluster-aware client that routes keys itself and follows redirects.
//! - **`config`**: Node configuration from flags and JSON files.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod membership;
pub mod routing;
pub mod rpc;
pub mod services;

pub use error::{Error, Result};
