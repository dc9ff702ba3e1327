//! Error Taxonomy
//!
//! A single error type shared by the engine, the wire protocol, the router and
//! the clients. Errors that cross the wire travel as the `Display` text of the
//! variant inside an Error reply, and [`Error::from_remote`] maps the
//! well-known messages back into typed variants on the client side.

use crate::routing::redirect::parse_redirect;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("protocol version between client and server doesn't match (expected {expected}, got {actual})")]
    ProtocolVersionMismatch { expected: u8, actual: u8 },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("handler not found")]
    CommandNotFound { command: u8 },

    #[error("command needs more arguments")]
    MissingArguments,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("the entry size will exceed if you set this entry")]
    CapacityExceeded,

    #[error("not found")]
    NotFound,

    /// Must render exactly as `routing::redirect::redirect_message(owner)`.
    #[error("redirect to node {owner}")]
    RedirectRequired { owner: String },

    #[error("no node is available")]
    NoAvailableNode,

    #[error("reached max redirect times ({0})")]
    MaxRedirectsExceeded(usize),

    /// An Error reply from a peer that has no typed counterpart.
    #[error("{0}")]
    Remote(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Rebuilds a typed error from the message carried by an Error reply.
    pub fn from_remote(message: String) -> Self {
        if let Some(owner) = parse_redirect(&message) {
            return Error::RedirectRequired {
                owner: owner.to_string(),
            };
        }

        match message.as_str() {
            "not found" => Error::NotFound,
            "handler not found" => Error::CommandNotFound { command: 0 },
            "the entry size will exceed if you set this entry" => Error::CapacityExceeded,
            "command needs more arguments" => Error::MissingArguments,
            _ => Error::Remote(message),
        }
    }

    /// True for failures of the underlying connection rather than of the request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionClosed | Error::MalformedFrame(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Snapshot(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedFrame(err.to_string())
    }
}
