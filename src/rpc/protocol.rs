//! Wire Protocol Constants
//!
//! Request frame:  `[version:1][command:1][argCount:4]{[argLen:4][arg]}*`
//! Response frame: `[version:1][reply:1][bodyLen:4][body]`
//!
//! All integers are big-endian and fixed width.

use crate::error::{Error, Result};

pub const PROTOCOL_VERSION: u8 = 1;

/// Largest argument or body accepted from the wire.
pub const MAX_CHUNK_LEN: u32 = 64 * 1024 * 1024;

/// Largest argument count accepted from the wire.
pub const MAX_ARG_COUNT: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Get = 1,
    Set = 2,
    Delete = 3,
    Status = 4,
    Nodes = 5,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Command::Get),
            2 => Some(Command::Set),
            3 => Some(Command::Delete),
            4 => Some(Command::Status),
            5 => Some(Command::Nodes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Success = 0,
    Error = 1,
}

impl ReplyCode {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ReplyCode::Success),
            1 => Ok(ReplyCode::Error),
            other => Err(Error::MalformedFrame(format!("unknown reply code {}", other))),
        }
    }
}

/// Encodes a TTL as the 8-byte big-endian argument of `Set`.
pub fn encode_ttl(ttl: i64) -> Vec<u8> {
    ttl.to_be_bytes().to_vec()
}

pub fn decode_ttl(bytes: &[u8]) -> Result<i64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::InvalidArgument(format!("ttl must be 8 bytes, got {}", bytes.len())))?;
    Ok(i64::from_be_bytes(raw))
}
