use thiserror::Error;

// Reasons a single frame is rejected, the connection itself stays usable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed frame")]
    MalformedFrame,
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),
    #[error("unrecognized payload type {0:?}")]
    UnrecognizedPayloadType(String),
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to serialize action: {0}")]
    Serialize(#[from] serde_json::Error),
}
