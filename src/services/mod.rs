//! Cache Services
//!
//! The request-facing side of a node. [`CacheService`] combines the router's
//! ownership decision with the local cache; the `tcp` and `http` modules
//! expose it over the binary protocol and over HTTP respectively.

pub mod http;
pub mod node;
pub mod tcp;

pub use http::{router as http_router, serve_http};
pub use node::CacheService;
pub use tcp::{bind_tcp, handler_registry, register_handlers};
