//! Binary RPC Transport
//!
//! A small length-prefixed request/response protocol over TCP.
//!
//! ## Submodules
//! - **`protocol`**: version byte, command opcodes, reply codes and TTL encoding.
//! - **`frame`**: encoding and decoding of request and response frames.
//! - **`server`**: connection-per-task server dispatching through a handler registry.
//! - **`client`**: a single connection with one request in flight.
//! - **`async_client`**: a queue-backed wrapper sharing one connection between many tasks.

pub mod async_client;
pub mod client;
pub mod frame;
pub mod protocol;
pub mod server;

pub use async_client::{AsyncClient, PendingReply};
pub use client::RpcClient;
pub use frame::{Request, Response};
pub use protocol::{Command, PROTOCOL_VERSION, ReplyCode};
pub use server::{HandlerRegistry, RpcServer};
