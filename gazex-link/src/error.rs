use std::io;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version cannot be checked")]
    Refused,
    #[error("unknown version: {0:#04x}")]
    Unsupported(u8),
    #[error("unexpected reply {0:#04x} to the version query")]
    UnexpectedReply(u8),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("protocol version check failed: {0}")]
    ProtocolVersion(#[from] VersionError),
    #[error("link I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("link is not connected")]
    NotConnected,
    #[error("clock is not synchronized")]
    NotSynchronized,
}
