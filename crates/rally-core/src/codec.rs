//! Text forms of clocks, dots and operations
//!
//! The wire format is delimiter driven:
//!
//! - a dot is `client:seq`
//! - a clock is dots joined by `~` (the empty clock is the empty string)
//! - an operation is `clock%client%payload`
//!
//! Lists of dots or operations are joined by `}` at the message level, so
//! payloads produced by a [`PayloadCodec`] must never contain `}` or a
//! newline. Client identifiers cannot contain any delimiter by construction.

use crate::causality::{Dot, Operation, OperationMetadata, VectorClock};
use crate::identifiers::ClientId;
use std::fmt;
use std::str::FromStr;

/// Separator between a client and its sequence number.
pub const ENTRY_SEPARATOR: char = ':';
/// Separator between clock entries.
pub const CLOCK_SEPARATOR: char = '~';
/// Separator between the fields of an operation.
pub const FIELD_SEPARATOR: char = '%';
/// Separator between list items inside a message body.
pub const LIST_SEPARATOR: char = '}';

/// Parse failures of the wire text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Message is empty
    #[error("empty message")]
    EmptyMessage,

    /// Message starts with a tag this protocol does not know
    #[error("unknown message tag {0:?}")]
    UnknownTag(char),

    /// Message carries a body its tag does not allow
    #[error("unexpected body after tag {0:?}")]
    UnexpectedBody(char),

    /// Client identifier failed validation
    #[error("malformed client id {0:?}")]
    MalformedClientId(String),

    /// Dot is not `client:seq` with a positive sequence
    #[error("malformed dot {0:?}")]
    MalformedDot(String),

    /// Clock entry could not be parsed
    #[error("malformed clock {0:?}")]
    MalformedClock(String),

    /// Operation is not `clock%client%payload`
    #[error("malformed operation {0:?}")]
    MalformedOperation(String),

    /// Application payload failed to decode
    #[error("payload error: {0}")]
    Payload(String),
}

/// Application-specific encoding of an operation payload.
pub trait PayloadCodec: Sized {
    /// Encode the payload; the result must not contain `}` or `\n`.
    fn encode_payload(&self) -> String;

    /// Decode a payload produced by [`PayloadCodec::encode_payload`].
    fn decode_payload(text: &str) -> Result<Self, WireError>;
}

fn parse_client(text: &str) -> Result<ClientId, WireError> {
    ClientId::new(text).map_err(|_| WireError::MalformedClientId(text.to_string()))
}

fn parse_entry(text: &str) -> Option<(ClientId, u64)> {
    let (client, sequence) = text.split_once(ENTRY_SEPARATOR)?;
    let client = ClientId::new(client).ok()?;
    let sequence = sequence.parse().ok()?;
    Some((client, sequence))
}

/// Encode a dot as `client:seq`.
pub fn encode_dot(dot: &Dot) -> String {
    dot.to_string()
}

/// Decode a dot; the sequence must be at least 1.
pub fn decode_dot(text: &str) -> Result<Dot, WireError> {
    match parse_entry(text) {
        Some((client, sequence)) if sequence >= 1 => Ok(Dot::new(client, sequence)),
        _ => Err(WireError::MalformedDot(text.to_string())),
    }
}

/// Encode a clock as `client:seq` pairs joined by `~`.
pub fn encode_clock(clock: &VectorClock) -> String {
    clock
        .iter()
        .map(|(client, sequence)| format!("{client}{ENTRY_SEPARATOR}{sequence}"))
        .collect::<Vec<_>>()
        .join(&CLOCK_SEPARATOR.to_string())
}

/// Decode a clock; the empty string is the empty clock.
pub fn decode_clock(text: &str) -> Result<VectorClock, WireError> {
    if text.is_empty() {
        return Ok(VectorClock::new());
    }
    text.split(CLOCK_SEPARATOR)
        .map(|entry| parse_entry(entry).ok_or_else(|| WireError::MalformedClock(text.to_string())))
        .collect()
}

/// Encode an operation as `clock%client%payload`.
pub fn encode_operation<Op: PayloadCodec>(operation: &Operation<Op>) -> String {
    format!(
        "{}{FIELD_SEPARATOR}{}{FIELD_SEPARATOR}{}",
        encode_clock(&operation.metadata.clock),
        operation.metadata.client,
        operation.op.encode_payload()
    )
}

/// Decode an operation. The payload is everything after the second `%`.
pub fn decode_operation<Op: PayloadCodec>(text: &str) -> Result<Operation<Op>, WireError> {
    let mut fields = text.splitn(3, FIELD_SEPARATOR);
    let (Some(clock), Some(client), Some(payload)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(WireError::MalformedOperation(text.to_string()));
    };

    let clock = decode_clock(clock)?;
    let client = parse_client(client)?;
    if clock.get(&client) == 0 {
        return Err(WireError::MalformedOperation(text.to_string()));
    }
    let op = Op::decode_payload(payload)?;
    Ok(Operation::new(OperationMetadata::new(clock, client), op))
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_clock(self))
    }
}

impl FromStr for VectorClock {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_clock(s)
    }
}

impl FromStr for Dot {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_dot(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[derive(Debug, Clone, PartialEq)]
    struct Note(String);

    impl PayloadCodec for Note {
        fn encode_payload(&self) -> String {
            self.0.clone()
        }

        fn decode_payload(text: &str) -> Result<Self, WireError> {
            Ok(Note(text.to_string()))
        }
    }

    fn id(s: &str) -> ClientId {
        ClientId::new(s).unwrap()
    }

    #[test]
    fn clock_text_form() {
        let clock: VectorClock = [(id("a"), 2), (id("b"), 7)].into_iter().collect();
        assert_eq!(encode_clock(&clock), "a:2~b:7");
        assert_eq!(decode_clock("a:2~b:7").unwrap(), clock);
        assert_eq!(clock.to_string().parse::<VectorClock>().unwrap(), clock);
    }

    #[test]
    fn empty_clock_is_empty_string() {
        assert_eq!(encode_clock(&VectorClock::new()), "");
        assert!(decode_clock("").unwrap().is_empty());
    }

    #[test]
    fn malformed_clocks_are_rejected() {
        for bad in ["a", "a:", ":1", "a:x", "a:1~", "a:-1", "a b:1"] {
            assert_matches!(decode_clock(bad), Err(WireError::MalformedClock(_)), "{bad:?}");
        }
    }

    #[test]
    fn dot_requires_positive_sequence() {
        assert_eq!(decode_dot("a:3").unwrap(), Dot::new(id("a"), 3));
        assert_matches!(decode_dot("a:0"), Err(WireError::MalformedDot(_)));
        assert_matches!(decode_dot("a"), Err(WireError::MalformedDot(_)));
    }

    #[test]
    fn operation_payload_may_contain_field_separator() {
        let clock: VectorClock = [(id("a"), 1)].into_iter().collect();
        let op = Operation::new(OperationMetadata::new(clock, id("a")), Note("50%".into()));
        let text = encode_operation(&op);
        assert_eq!(text, "a:1%a%50%");
        assert_eq!(decode_operation::<Note>(&text).unwrap(), op);
    }

    #[test]
    fn operation_author_must_appear_in_clock() {
        assert_matches!(
            decode_operation::<Note>("b:1%a%x"),
            Err(WireError::MalformedOperation(_))
        );
        assert_matches!(
            decode_operation::<Note>("a:1%a"),
            Err(WireError::MalformedOperation(_))
        );
        assert_matches!(
            decode_operation::<Note>("a:1%a:b%x"),
            Err(WireError::MalformedClientId(_))
        );
    }
}
