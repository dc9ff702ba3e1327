//! Concurrent Client Multiplexer
//!
//! Lets many tasks share one [`RpcClient`] connection. Callers push requests
//! into a bounded queue; a single worker task drains it, performs each call
//! on the connection and hands the result back through a one-shot channel.
//! The connection therefore never has more than one request in flight, and a
//! full queue makes callers wait instead of growing without bound.

use super::client::{RpcClient, set_args};
use super::protocol::Command;
use crate::error::{Error, Result};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const DEFAULT_QUEUE_CAPACITY: usize = 16 * 1024;

struct Call {
    command: u8,
    args: Vec<Vec<u8>>,
    reply: oneshot::Sender<Result<Vec<u8>>>,
}

/// Completion handle of a queued request.
pub struct PendingReply {
    receiver: oneshot::Receiver<Result<Vec<u8>>>,
}

impl PendingReply {
    /// Waits for the worker to finish the call.
    pub async fn wait(self) -> Result<Vec<u8>> {
        self.receiver.await.unwrap_or(Err(Error::ConnectionClosed))
    }
}

pub struct AsyncClient {
    sender: mpsc::Sender<Call>,
    worker: JoinHandle<()>,
}

impl AsyncClient {
    pub async fn connect(address: &str, queue_capacity: usize) -> Result<Self> {
        let client = RpcClient::connect(address).await?;
        Ok(Self::new(client, queue_capacity))
    }

    pub fn new(client: RpcClient, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(drain(client, receiver));
        Self { sender, worker }
    }

    /// Queues a raw request. Waits while the queue is full.
    pub async fn submit(&self, command: u8, args: Vec<Vec<u8>>) -> Result<PendingReply> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Call {
                command,
                args,
                reply,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(PendingReply { receiver })
    }

    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<PendingReply> {
        self.submit(Command::Get.code(), vec![key.as_ref().to_vec()])
            .await
    }

    pub async fn set(&self, key: impl AsRef<[u8]>, value: &[u8], ttl: i64) -> Result<PendingReply> {
        self.submit(Command::Set.code(), set_args(key.as_ref(), value, ttl))
            .await
    }

    pub async fn delete(&self, key: impl AsRef<[u8]>) -> Result<PendingReply> {
        self.submit(Command::Delete.code(), vec![key.as_ref().to_vec()])
            .await
    }

    pub async fn status(&self) -> Result<PendingReply> {
        self.submit(Command::Status.code(), Vec::new()).await
    }

    /// Stops accepting requests, lets queued ones finish and closes the connection.
    pub async fn close(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            tracing::error!("Async client worker failed: {}", e);
        }
    }
}

async fn drain(mut client: RpcClient, mut receiver: mpsc::Receiver<Call>) {
    while let Some(call) = receiver.recv().await {
        let result = client.call(call.command, call.args).await;
        // The caller may have dropped its handle; the result is then discarded.
        let _ = call.reply.send(result);
    }
    tracing::debug!("Async client for {} drained", client.address());
}
