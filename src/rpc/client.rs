use super::frame::{Request, Response};
use super::protocol::{Command, encode_ttl};
use crate::cache::Status;
use crate::error::{Error, Result};

use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// A single connection with one request in flight at a time.
pub struct RpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    address: String,
}

impl RpcClient {
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            address: address.to_string(),
        })
    }

    /// Address this client was connected with.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends one request and waits for its response.
    pub async fn call(&mut self, command: u8, args: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        Request::new(command, args).write_to(&mut self.writer).await?;
        Response::read_from(&mut self.reader).await?.into_result()
    }

    pub async fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        match self.call(Command::Get.code(), vec![key.as_ref().to_vec()]).await {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set(&mut self, key: impl AsRef<[u8]>, value: &[u8], ttl: i64) -> Result<()> {
        self.call(Command::Set.code(), set_args(key.as_ref(), value, ttl))
            .await
            .map(|_| ())
    }

    pub async fn delete(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.call(Command::Delete.code(), vec![key.as_ref().to_vec()])
            .await
            .map(|_| ())
    }

    pub async fn status(&mut self) -> Result<Status> {
        let body = self.call(Command::Status.code(), Vec::new()).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn nodes(&mut self) -> Result<Vec<String>> {
        let body = self.call(Command::Nodes.code(), Vec::new()).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Arguments of a `Set` request: `[ttl, key, value]`.
pub fn set_args(key: &[u8], value: &[u8], ttl: i64) -> Vec<Vec<u8>> {
    vec![encode_ttl(ttl), key.to_vec(), value.to_vec()]
}
