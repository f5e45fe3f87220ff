use std::fmt;
use std::io::ErrorKind;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::trace;

use crate::error::{DecodeError, ProtocolError};
use crate::{decode, encode, Action};

// Longest accepted line in bytes. A 1000 character message of 4 byte
// utf8 characters plus verb, name and json overhead still fits.
pub const MAX_FRAME_LEN: usize = 8 * 1024;

const TYPE_FIELD: &str = "type";
const KNOWN_TYPES: [&str; 3] = ["new", "bye", "say"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    #[default]
    Text,
    Object,
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Framing::Text),
            "object" => Ok(Framing::Object),
            other => Err(format!("unknown framing {:?}, expected text or object", other)),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Text => f.write_str("text"),
            Framing::Object => f.write_str("object"),
        }
    }
}

/// One decoded line. The raw text is kept so the server can fan the frame out
/// verbatim, the action carries the outcome of decoding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub raw: String,
    pub action: Result<Action, DecodeError>,
}

impl Frame {
    fn rejected(raw: String, err: DecodeError) -> Self {
        Frame { raw, action: Err(err) }
    }
}

/// Parses one object framed line, a json encoded action.
pub fn decode_object(raw: &str) -> Result<Action, DecodeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DecodeError::CorruptPayload(e.to_string()))?;

    match value.get(TYPE_FIELD).and_then(Value::as_str) {
        Some(t) if KNOWN_TYPES.contains(&t) => (),
        Some(t) => return Err(DecodeError::UnrecognizedPayloadType(t.to_owned())),
        None => return Err(DecodeError::CorruptPayload("missing type tag".to_owned())),
    }

    let action: Action = serde_json::from_value(value)
        .map_err(|e| DecodeError::CorruptPayload(e.to_string()))?;
    action.validate()?;

    Ok(action)
}

/// Renders an action as a raw frame for the given framing, without newline.
pub fn encode_frame(action: &Action, framing: Framing) -> Result<String, ProtocolError> {
    match framing {
        Framing::Text => Ok(encode(action)),
        Framing::Object => Ok(serde_json::to_string(action)?),
    }
}

// Newline delimited frames in either text or object framing
#[derive(Debug)]
pub struct ChatCodec {
    framing: Framing,
    lines: LinesCodec,
}

impl ChatCodec {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            lines: LinesCodec::new_with_max_length(MAX_FRAME_LEN),
        }
    }

    fn to_frame(&self, line: String) -> Frame {
        let action = match self.framing {
            Framing::Text => decode(&line),
            Framing::Object => decode_object(&line),
        };

        Frame { raw: line, action }
    }

    // Only real i/o failures end the stream. Oversized or non utf8 lines have
    // already been consumed by the lines codec and turn into rejected frames.
    fn lift(&self, result: Result<Option<String>, LinesCodecError>) -> Result<Option<Frame>, ProtocolError> {
        match result {
            Ok(Some(line)) => Ok(Some(self.to_frame(line))),
            Ok(None) => Ok(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                trace!("discarding line longer than {} bytes", MAX_FRAME_LEN);
                Ok(Some(Frame::rejected(String::new(), DecodeError::MalformedFrame)))
            },
            Err(LinesCodecError::Io(e)) if e.kind() == ErrorKind::InvalidData => {
                trace!("discarding line that is not utf8");
                Ok(Some(Frame::rejected(String::new(), DecodeError::MalformedFrame)))
            },
            Err(LinesCodecError::Io(e)) => Err(e.into()),
        }
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        ChatCodec::new(Framing::Text)
    }
}

impl Decoder for ChatCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let result = self.lines.decode(src);
        self.lift(result)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let result = self.lines.decode_eof(src);
        self.lift(result)
    }
}

impl Encoder<Action> for ChatCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Action, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = encode_frame(&item, self.framing)?;
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
