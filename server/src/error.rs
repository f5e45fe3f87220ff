use std::net::SocketAddr;

use thiserror::Error;

use chat_protocol::DecodeError;

// Policy violations caused by a single frame, handled inside the connection worker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("not a msg: {0}")]
    Frame(#[from] DecodeError),
    #[error("not new: {0} is already registered")]
    DuplicateName(String),
    #[error("wrong IP or port for {name}: registered from {expected}, frame from {actual}")]
    AddressMismatch {
        name: String,
        expected: SocketAddr,
        actual: SocketAddr,
    },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings: {0}")]
    Config(#[from] config::ConfigError),
}
