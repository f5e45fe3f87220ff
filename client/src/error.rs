use thiserror::Error;

use chat_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("invalid chat name {0:?}, use 1 to 50 letters, digits or punctuation")]
    InvalidName(String),
}
