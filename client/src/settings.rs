use chat_protocol::{is_valid_name, Framing};

use crate::error::ClientError;

pub const DEFAULT_SERVER: &str = "127.0.0.1:4321";

/// What a client session needs to know before it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server: String,
    pub name: String,
    pub framing: Framing,
}

impl ClientSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            name: name.into(),
            framing: Framing::default(),
        }
    }

    // The server would reject or kick a bad name, so catch it before connecting
    pub fn validate(&self) -> Result<(), ClientError> {
        if is_valid_name(&self.name) {
            Ok(())
        } else {
            Err(ClientError::InvalidName(self.name.clone()))
        }
    }
}
