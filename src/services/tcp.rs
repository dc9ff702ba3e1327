use super::node::CacheService;
use crate::error::{Error, Result};
use crate::rpc::protocol::decode_ttl;
use crate::rpc::{Command, HandlerRegistry, RpcServer};

use std::sync::Arc;
use tokio::net::ToSocketAddrs;

/// A registry serving the five cache commands from `service`.
pub fn handler_registry(service: Arc<CacheService>) -> Arc<HandlerRegistry> {
    let registry = HandlerRegistry::new();
    register_handlers(&registry, service);
    registry
}

/// Registers Get/Set/Delete/Status/Nodes on an existing registry.
pub fn register_handlers(registry: &HandlerRegistry, service: Arc<CacheService>) {
    let svc = service.clone();
    registry.register(Command::Get, move |args: Vec<Vec<u8>>| {
        let svc = svc.clone();
        async move {
            let key = key_arg(&args, 0, 1)?;
            svc.get(key).await?.ok_or(Error::NotFound)
        }
    });

    let svc = service.clone();
    registry.register(Command::Set, move |args: Vec<Vec<u8>>| {
        let svc = svc.clone();
        async move {
            let key = key_arg(&args, 1, 3)?;
            let ttl = decode_ttl(&args[0])?;
            svc.set(key, &args[2], ttl).await?;
            Ok::<_, Error>(Vec::new())
        }
    });

    let svc = service.clone();
    registry.register(Command::Delete, move |args: Vec<Vec<u8>>| {
        let svc = svc.clone();
        async move {
            let key = key_arg(&args, 0, 1)?;
            svc.delete(key).await?;
            Ok::<_, Error>(Vec::new())
        }
    });

    let svc = service.clone();
    registry.register(Command::Status, move |_args: Vec<Vec<u8>>| {
        let svc = svc.clone();
        async move { Ok::<_, Error>(serde_json::to_vec(&svc.status().await)?) }
    });

    registry.register(Command::Nodes, move |_args: Vec<Vec<u8>>| {
        let svc = service.clone();
        async move { Ok::<_, Error>(serde_json::to_vec(&svc.nodes())?) }
    });
}

/// Binds the binary-protocol listener for `service`.
pub async fn bind_tcp<A: ToSocketAddrs>(address: A, service: Arc<CacheService>) -> Result<RpcServer> {
    RpcServer::bind(address, handler_registry(service)).await
}

/// Key at `index`, after checking that at least `required` arguments arrived.
/// Keys are arbitrary bytes.
fn key_arg(args: &[Vec<u8>], index: usize, required: usize) -> Result<&[u8]> {
    if args.len() < required {
        return Err(Error::MissingArguments);
    }
    Ok(&args[index])
}
