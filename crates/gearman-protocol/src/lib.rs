//! Gearman binary protocol: command table, packet codec and server connections.

mod codec;
mod command;
mod connection;
mod frame;

pub use codec::GearmanCodec;
pub use command::Command;
pub use connection::{split_address, Connection, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT};
pub use frame::{Frame, Header, Magic, DEFAULT_ERROR_TEXT};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    UnknownCommand(String),

    #[error("Connection was reset")]
    ConnectionReset,

    #[error("Received an invalid response header (magic {0:?})")]
    MalformedHeader(Vec<u8>),

    #[error("Invalid response type returned: {0}")]
    UnknownResponseType(u32),

    #[error("Server error {code}: {text}")]
    ServerError { code: String, text: String },

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Can't connect to server {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not write command to socket: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("Blocking read timed out after {0:?}")]
    ReadTimeout(std::time::Duration),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(Command),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Every packet starts with a fixed 12-byte header
pub const HEADER_SIZE: usize = 12;

/// Largest payload accepted from or sent to a server: 64MB
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;
