//! Anti-entropy wire format
//!
//! A message is a one-character tag followed by a tag-specific body:
//!
//! | tag | message | body |
//! |-----|---------|------|
//! | `c` | `CurrentState` | clock |
//! | `s` | `StopConnection` | none |
//! | `r` | `RequestVersions` | clock, then `}` + dot per requested dot |
//! | `v` | `SendVersions` | clock, then `}` + operation per operation |
//!
//! Unknown tags are a hard error; the session treats any decode failure as
//! fatal to the connection.

use crate::message::Message;
use rally_core::codec::{
    decode_clock, decode_dot, decode_operation, encode_clock, encode_dot, encode_operation,
    LIST_SEPARATOR,
};
use rally_core::{PayloadCodec, WireError};

const CURRENT_STATE: char = 'c';
const STOP_CONNECTION: char = 's';
const REQUEST_VERSIONS: char = 'r';
const SEND_VERSIONS: char = 'v';

/// Encode a message as one line of text.
pub fn encode<Op: PayloadCodec>(message: &Message<Op>) -> String {
    match message {
        Message::CurrentState(clock) => format!("{CURRENT_STATE}{}", encode_clock(clock)),
        Message::StopConnection => STOP_CONNECTION.to_string(),
        Message::RequestVersions(clock, dots) => {
            let mut text = format!("{REQUEST_VERSIONS}{}", encode_clock(clock));
            for dot in dots {
                text.push(LIST_SEPARATOR);
                text.push_str(&encode_dot(dot));
            }
            text
        }
        Message::SendVersions(clock, operations) => {
            let mut text = format!("{SEND_VERSIONS}{}", encode_clock(clock));
            for operation in operations {
                text.push(LIST_SEPARATOR);
                text.push_str(&encode_operation(operation));
            }
            text
        }
    }
}

/// Decode a message produced by [`encode`].
pub fn decode<Op: PayloadCodec>(text: &str) -> Result<Message<Op>, WireError> {
    let mut chars = text.chars();
    let tag = chars.next().ok_or(WireError::EmptyMessage)?;
    let body = chars.as_str();

    match tag {
        CURRENT_STATE => Ok(Message::CurrentState(decode_clock(body)?)),
        STOP_CONNECTION if body.is_empty() => Ok(Message::StopConnection),
        STOP_CONNECTION => Err(WireError::UnexpectedBody(STOP_CONNECTION)),
        REQUEST_VERSIONS => {
            let mut items = body.split(LIST_SEPARATOR);
            let clock = decode_clock(items.next().unwrap_or_default())?;
            let dots = items.map(decode_dot).collect::<Result<_, _>>()?;
            Ok(Message::RequestVersions(clock, dots))
        }
        SEND_VERSIONS => {
            let mut items = body.split(LIST_SEPARATOR);
            let clock = decode_clock(items.next().unwrap_or_default())?;
            let operations = items.map(decode_operation).collect::<Result<_, _>>()?;
            Ok(Message::SendVersions(clock, operations))
        }
        other => Err(WireError::UnknownTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rally_core::{ClientId, Dot, Operation, OperationMetadata, VectorClock};

    #[derive(Debug, Clone, PartialEq)]
    struct Word(String);

    impl PayloadCodec for Word {
        fn encode_payload(&self) -> String {
            self.0.clone()
        }

        fn decode_payload(text: &str) -> Result<Self, WireError> {
            if text.is_empty() {
                return Err(WireError::Payload("empty word".into()));
            }
            Ok(Word(text.to_string()))
        }
    }

    fn id(s: &str) -> ClientId {
        ClientId::new(s).unwrap()
    }

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        entries.iter().map(|(c, n)| (id(c), *n)).collect()
    }

    fn op(author: &str, entries: &[(&str, u64)], word: &str) -> Operation<Word> {
        Operation::new(
            OperationMetadata::new(clock(entries), id(author)),
            Word(word.into()),
        )
    }

    fn round_trip(message: Message<Word>) {
        let text = encode(&message);
        assert_eq!(decode::<Word>(&text).unwrap(), message, "{text:?}");
    }

    #[test]
    fn every_variant_round_trips() {
        round_trip(Message::CurrentState(clock(&[("a", 2), ("b", 1)])));
        round_trip(Message::StopConnection);
        round_trip(Message::RequestVersions(
            clock(&[("a", 2)]),
            vec![Dot::new(id("a"), 1), Dot::new(id("a"), 2)],
        ));
        round_trip(Message::SendVersions(
            clock(&[("a", 2), ("b", 1)]),
            vec![op("a", &[("a", 1)], "x1"), op("b", &[("a", 1), ("b", 1)], "y%1")],
        ));
    }

    #[test]
    fn empty_bodies_round_trip() {
        round_trip(Message::CurrentState(VectorClock::new()));
        round_trip(Message::RequestVersions(VectorClock::new(), Vec::new()));
        round_trip(Message::RequestVersions(clock(&[("a", 1)]), Vec::new()));
        round_trip(Message::SendVersions(VectorClock::new(), Vec::new()));
    }

    #[test]
    fn encoded_forms() {
        assert_eq!(encode::<Word>(&Message::CurrentState(VectorClock::new())), "c");
        assert_eq!(encode::<Word>(&Message::StopConnection), "s");
        assert_eq!(
            encode::<Word>(&Message::RequestVersions(
                clock(&[("a", 2)]),
                vec![Dot::new(id("a"), 2)]
            )),
            "ra:2}a:2"
        );
        assert_eq!(
            encode(&Message::SendVersions(
                clock(&[("a", 1)]),
                vec![op("a", &[("a", 1)], "x")]
            )),
            "va:1}a:1%a%x"
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_matches!(decode::<Word>("xa:1"), Err(WireError::UnknownTag('x')));
        assert_matches!(decode::<Word>("Ca:1"), Err(WireError::UnknownTag('C')));
        assert_matches!(decode::<Word>(""), Err(WireError::EmptyMessage));
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert_matches!(decode::<Word>("ca:"), Err(WireError::MalformedClock(_)));
        assert_matches!(decode::<Word>("ra:1}a:0"), Err(WireError::MalformedDot(_)));
        assert_matches!(decode::<Word>("ra:1}"), Err(WireError::MalformedDot(_)));
        assert_matches!(
            decode::<Word>("va:1}a:1%a"),
            Err(WireError::MalformedOperation(_))
        );
        assert_matches!(decode::<Word>("va:1}a:1%a%"), Err(WireError::Payload(_)));
        assert_matches!(decode::<Word>("sgarbage"), Err(WireError::UnexpectedBody('s')));
        assert_matches!(decode::<Word>("s "), Err(WireError::UnexpectedBody('s')));
    }
}
