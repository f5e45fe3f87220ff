//! Wire protocol shared by the chat server and its clients.
//!
//! A frame is one newline terminated line. In text framing a line reads
//! `new <name>`, `bye <name>` or `say <name> <message>`; in object framing
//! the same three actions travel as one JSON object per line.

use serde::{Deserialize, Serialize};

mod codec;
mod error;

pub use codec::{decode_object, encode_frame, ChatCodec, Frame, Framing, MAX_FRAME_LEN};
pub use error::{DecodeError, ProtocolError};

pub const NAME_MAX_LEN: usize = 50;
pub const MESSAGE_MAX_LEN: usize = 1000;

const VERB_NEW: &str = "new";
const VERB_BYE: &str = "bye";
const VERB_SAY: &str = "say";
const VERB_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    New { name: String },
    Bye { name: String },
    Say { name: String, message: String },
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Action::New { name: name.into() }
    }

    pub fn bye(name: impl Into<String>) -> Self {
        Action::Bye { name: name.into() }
    }

    pub fn say(name: impl Into<String>, message: impl Into<String>) -> Self {
        Action::Say { name: name.into(), message: message.into() }
    }

    // participant the action is about
    pub fn name(&self) -> &str {
        match self {
            Action::New { name } | Action::Bye { name } | Action::Say { name, .. } => name,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Action::New { .. } => VERB_NEW,
            Action::Bye { .. } => VERB_BYE,
            Action::Say { .. } => VERB_SAY,
        }
    }

    /// Checks the name and message limits, used for actions that did not come
    /// through the text parser (object framing, locally built actions).
    pub fn validate(&self) -> Result<(), DecodeError> {
        if !is_valid_name(self.name()) {
            return Err(DecodeError::MalformedFrame);
        }

        match self {
            Action::Say { message, .. } if !is_valid_message(message) => Err(DecodeError::MalformedFrame),
            _ => Ok(()),
        }
    }

    // text shown to the user once a listener decodes this action
    pub fn render(&self) -> String {
        match self {
            Action::New { name } => format!("{} joined the channel.", name),
            Action::Bye { name } => format!("{} left the channel.", name),
            Action::Say { name, message } => format!("{}: {}", name, message),
        }
    }
}

pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_ascii_punctuation()
}

pub fn is_valid_name(name: &str) -> bool {
    (1..=NAME_MAX_LEN).contains(&name.len()) && name.chars().all(is_name_char)
}

pub fn is_valid_message(message: &str) -> bool {
    !message.contains(['\r', '\n']) && message.chars().count() <= MESSAGE_MAX_LEN
}

// Generic frame layout: verb, name and the optional message part,
// before the verb itself is interpreted
struct Shape<'a> {
    verb: &'a str,
    name: &'a str,
    message: Option<&'a str>,
}

impl<'a> Shape<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let bytes = line.as_bytes();

        if bytes.len() < VERB_LEN + 2
            || !bytes[..VERB_LEN].iter().all(u8::is_ascii_lowercase)
            || bytes[VERB_LEN] != b' ' {
            return None
        }

        // verb and separator are ascii so these offsets sit on char boundaries
        let verb = &line[..VERB_LEN];
        let rest = &line[VERB_LEN + 1..];

        let (name, message) = match rest.split_once(' ') {
            Some((name, message)) => (name, Some(message)),
            None => (rest, None),
        };

        if !is_valid_name(name) {
            return None
        }

        if let Some(m) = message {
            if !is_valid_message(m) {
                return None
            }
        }

        Some(Shape { verb, name, message })
    }
}

/// Returns true when the line has the generic frame shape: a three letter
/// lowercase verb, a name token and optionally a message.
/// The verb itself is not checked.
pub fn is_well_formed(line: &str) -> bool {
    Shape::parse(line).is_some()
}

/// Parses one text line (without its newline) into an action.
pub fn decode(line: &str) -> Result<Action, DecodeError> {
    let shape = Shape::parse(line).ok_or(DecodeError::MalformedFrame)?;
    let name = shape.name.to_owned();

    match (shape.verb, shape.message) {
        (VERB_NEW, None) => Ok(Action::New { name }),
        (VERB_BYE, None) => Ok(Action::Bye { name }),
        (VERB_SAY, Some(message)) => Ok(Action::Say { name, message: message.to_owned() }),
        (VERB_NEW | VERB_BYE | VERB_SAY, _) => Err(DecodeError::MalformedFrame),
        (verb, _) => Err(DecodeError::UnknownVerb(verb.to_owned())),
    }
}

/// Renders an action as a text line, without the trailing newline.
pub fn encode(action: &Action) -> String {
    match action {
        Action::New { name } | Action::Bye { name } => format!("{} {}", action.verb(), name),
        Action::Say { name, message } => format!("{} {} {}", action.verb(), name, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_three_verbs() {
        assert_eq!(decode("new Alice"), Ok(Action::new("Alice")));
        assert_eq!(decode("bye Alice"), Ok(Action::bye("Alice")));
        assert_eq!(decode("say Alice Hello there"), Ok(Action::say("Alice", "Hello there")));
    }

    #[test]
    fn say_keeps_the_rest_of_the_line() {
        assert_eq!(decode("say Bob  two  spaces "), Ok(Action::say("Bob", " two  spaces ")));
        assert_eq!(decode("say Bob ünïcödé ✓"), Ok(Action::say("Bob", "ünïcödé ✓")));
        assert_eq!(decode("say Bob "), Ok(Action::say("Bob", "")));
    }

    #[test]
    fn say_without_message_separator_is_malformed() {
        assert_eq!(decode("say Bob"), Err(DecodeError::MalformedFrame));
    }

    #[test]
    fn new_and_bye_take_only_a_name() {
        assert_eq!(decode("new Alice extra"), Err(DecodeError::MalformedFrame));
        assert_eq!(decode("bye Alice "), Err(DecodeError::MalformedFrame));
    }

    #[test]
    fn unknown_verb_passes_shape_but_not_decode() {
        assert!(is_well_formed("hug Alice"));
        assert_eq!(decode("hug Alice"), Err(DecodeError::UnknownVerb("hug".into())));
    }

    #[test]
    fn rejects_bad_shapes() {
        let lines = [
            "",
            "new",
            "new ",
            "New Alice",
            "news Alice",
            "new  Alice",
            "new\tAlice",
            "new Al\tice",
            "new Zoë",
            "say Alice line\rbreak",
        ];

        for line in lines {
            assert!(!is_well_formed(line), "{:?} should be rejected", line);
            assert_eq!(decode(line), Err(DecodeError::MalformedFrame), "{:?}", line);
        }
    }

    #[test]
    fn name_limits() {
        let fifty = "a".repeat(NAME_MAX_LEN);
        let fifty_one = "a".repeat(NAME_MAX_LEN + 1);

        assert_eq!(decode(&format!("new {}", fifty)), Ok(Action::new(fifty.clone())));
        assert_eq!(decode(&format!("new {}", fifty_one)), Err(DecodeError::MalformedFrame));
        assert_eq!(decode("new a.b-c_d!?#"), Ok(Action::new("a.b-c_d!?#")));
    }

    #[test]
    fn message_limits() {
        let max = "x".repeat(MESSAGE_MAX_LEN);
        let over = "x".repeat(MESSAGE_MAX_LEN + 1);

        assert_eq!(decode(&format!("say Bob {}", max)), Ok(Action::say("Bob", max.clone())));
        assert_eq!(decode(&format!("say Bob {}", over)), Err(DecodeError::MalformedFrame));
    }

    #[test]
    fn encode_is_the_inverse_of_decode() {
        let actions = [Action::new("Alice"), Action::bye("Alice"), Action::say("Alice", "Hello"), Action::say("Alice", "")];

        for action in actions {
            assert_eq!(decode(&encode(&action)), Ok(action));
        }
    }

    #[test]
    fn validate_checks_limits() {
        assert!(Action::say("Alice", "hi").validate().is_ok());
        assert_eq!(Action::new("has space").validate(), Err(DecodeError::MalformedFrame));
        assert_eq!(Action::new("").validate(), Err(DecodeError::MalformedFrame));
        assert_eq!(Action::say("Alice", "a\nb").validate(), Err(DecodeError::MalformedFrame));
    }

    #[test]
    fn renders_for_display() {
        assert_eq!(Action::new("Bob").render(), "Bob joined the channel.");
        assert_eq!(Action::bye("Bob").render(), "Bob left the channel.");
        assert_eq!(Action::say("Alice", "Hello").render(), "Alice: Hello");
    }
}
