//! Routing-aware cluster client built on the binary protocol.

pub mod cluster;

pub use cluster::{
    ClientOptions, ClusterClient, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_REDIRECTS,
    DEFAULT_REFRESH_INTERVAL,
};
