use self::response::Response;

pub mod codec;
pub mod command;
pub mod response;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("I/O error: {:?}", _0)]
    Io(#[from] std::io::Error),

    #[error("Malformed VISA resource string: {0}")]
    BadResource(String),

    #[error("Unsupported transport for resource: {0}")]
    UnsupportedTransport(String),

    #[error("No reply from instrument within {:?}", _0)]
    Timeout(Duration),

    #[error("Could not parse instrument reply: {0:?}")]
    Parse(String),

    #[error("Unexpected reply: {:?}", _0)]
    Unexpected(Response),

    #[error("Connection was closed")]
    Abort,
}

pub type Result<T> = std::result::Result<T, ProtoError>;
