//! Command Server
//!
//! Accepts TCP connections and runs one task per connection. Each task reads
//! request frames, looks the command byte up in a [`HandlerRegistry`] and
//! writes back exactly one response per request.

use super::frame::{Request, Response};
use super::protocol::Command;
use crate::error::{Error, Result};

use dashmap::DashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// Type-erased async command handler: arguments in, reply body out.
pub type HandlerFn =
    Arc<dyn Fn(Vec<Vec<u8>>) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send>> + Send + Sync>;

/// Maps command bytes to the closures that serve them.
pub struct HandlerRegistry {
    handlers: DashMap<u8, HandlerFn>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `handler` for `command`, replacing any previous one.
    pub fn register<F, Fut>(&self, command: Command, handler: F)
    where
        F: Fn(Vec<Vec<u8>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        let handler_fn: HandlerFn = Arc::new(move |args: Vec<Vec<u8>>| {
            Box::pin(handler(args)) as Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send>>
        });
        self.handlers.insert(command.code(), handler_fn);

        tracing::debug!("Registered handler for command {:?}", command);
    }

    pub fn has_handler(&self, command: u8) -> bool {
        self.handlers.contains_key(&command)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Runs the handler registered for `command`.
    pub async fn execute(&self, command: u8, args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        // Clone the handler out so no map guard is held across the await.
        let handler = self
            .handlers
            .get(&command)
            .map(|entry| entry.value().clone())
            .ok_or(Error::CommandNotFound { command })?;
        handler(args).await
    }

    /// Turns a request into its response frame.
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.execute(request.command, request.args).await {
            Ok(body) => Response::success(body),
            Err(e) => {
                tracing::debug!("Command {} failed: {}", request.command, e);
                Response::error(e.to_string())
            }
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

pub struct RpcServer {
    listener: TcpListener,
    registry: Arc<HandlerRegistry>,
}

impl RpcServer {
    pub async fn bind<A: ToSocketAddrs>(address: A, registry: Arc<HandlerRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until the process exits.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves. Open connections keep running on
    /// their own tasks.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!("RPC server listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("RPC server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let registry = self.registry.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, registry).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                    }
                },
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Arc<HandlerRegistry>) {
    tracing::debug!("Accepted connection from {}", peer);

    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    loop {
        let request = match Request::read_from(&mut reader).await {
            Ok(request) => request,
            Err(Error::ProtocolVersionMismatch { actual, .. }) => {
                tracing::warn!("Discarding frame with protocol version {} from {}", actual, peer);
                continue;
            }
            Err(e) => {
                // EOF or a desynchronised stream: the connection cannot recover.
                tracing::debug!("Closing connection from {}: {}", peer, e);
                break;
            }
        };

        let response = registry.dispatch(request).await;
        if let Err(e) = response.write_to(&mut writer).await {
            tracing::error!("Failed to write response to {}: {}", peer, e);
            break;
        }
    }
}
