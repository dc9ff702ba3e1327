use super::protocol::{MAX_ARG_COUNT, MAX_CHUNK_LEN, PROTOCOL_VERSION, ReplyCode};
use crate::error::{Error, Result};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub version: u8,
    pub command: u8,
    pub args: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: u8,
    pub reply: ReplyCode,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(command: u8, args: Vec<Vec<u8>>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            command,
            args,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload: usize = self.args.iter().map(|arg| 4 + arg.len()).sum();
        let mut buf = Vec::with_capacity(6 + payload);
        buf.push(self.version);
        buf.push(self.command);
        buf.extend_from_slice(&(self.args.len() as u32).to_be_bytes());
        for arg in &self.args {
            buf.extend_from_slice(&(arg.len() as u32).to_be_bytes());
            buf.extend_from_slice(arg);
        }
        buf
    }

    /// Reads one complete request frame.
    ///
    /// A frame carrying a foreign version is still consumed to its end and
    /// then reported as `ProtocolVersionMismatch`, so the stream stays aligned
    /// on the next frame.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let version = reader.read_u8().await?;
        let command = reader.read_u8().await?;
        let arg_count = reader.read_u32().await?;
        if arg_count > MAX_ARG_COUNT {
            return Err(Error::MalformedFrame(format!(
                "argument count {} exceeds {}",
                arg_count, MAX_ARG_COUNT
            )));
        }

        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(read_chunk(reader).await?);
        }

        check_version(version)?;
        Ok(Self {
            version,
            command,
            args,
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Response {
    pub fn success(body: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            reply: ReplyCode::Success,
            body,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            reply: ReplyCode::Error,
            body: message.into().into_bytes(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(6 + self.body.len());
        buf.push(self.version);
        buf.push(self.reply as u8);
        buf.extend_from_slice(&(self.body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.body);
        buf
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let version = reader.read_u8().await?;
        let reply = reader.read_u8().await?;
        let body = read_chunk(reader).await?;

        check_version(version)?;
        Ok(Self {
            version,
            reply: ReplyCode::from_code(reply)?,
            body,
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Success body, or the typed error carried by an Error reply.
    pub fn into_result(self) -> Result<Vec<u8>> {
        match self.reply {
            ReplyCode::Success => Ok(self.body),
            ReplyCode::Error => Err(Error::from_remote(
                String::from_utf8_lossy(&self.body).into_owned(),
            )),
        }
    }
}

fn check_version(version: u8) -> Result<()> {
    if version != PROTOCOL_VERSION {
        return Err(Error::ProtocolVersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: version,
        });
    }
    Ok(())
}

async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32().await?;
    if len > MAX_CHUNK_LEN {
        return Err(Error::MalformedFrame(format!(
            "chunk of {} bytes exceeds {}",
            len, MAX_CHUNK_LEN
        )));
    }
    let mut chunk = vec![0u8; len as usize];
    reader.read_exact(&mut chunk).await?;
    Ok(chunk)
}
