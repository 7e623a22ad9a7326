//! Text payloads of tracker operations
//!
//! Fields are comma separated after a one-letter tag. Names are hex encoded
//! so they may contain any character, including the protocol delimiters.
//!
//! | tag | operation | fields |
//! |-----|-----------|--------|
//! | `a` | add | name, initiative |
//! | `n` | rename | character, name |
//! | `i` | set initiative | character, initiative |
//! | `d` | remove | character |
//! | `t` | take turn | character, predecessor (empty for the first turn) |

use crate::ops::TrackerOp;
use rally_core::{Dot, PayloadCodec, WireError};

const FIELD: char = ',';

fn payload_error(text: &str) -> WireError {
    WireError::Payload(format!("malformed tracker op {text:?}"))
}

fn decode_name(field: &str) -> Result<String, WireError> {
    let bytes = hex::decode(field).map_err(|_| payload_error(field))?;
    String::from_utf8(bytes).map_err(|_| payload_error(field))
}

fn decode_initiative(field: &str) -> Result<i32, WireError> {
    field.parse().map_err(|_| payload_error(field))
}

impl PayloadCodec for TrackerOp {
    fn encode_payload(&self) -> String {
        match self {
            TrackerOp::AddCharacter { name, initiative } => {
                format!("a{}{FIELD}{initiative}", hex::encode(name))
            }
            TrackerOp::RenameCharacter { character, name } => {
                format!("n{character}{FIELD}{}", hex::encode(name))
            }
            TrackerOp::SetInitiative {
                character,
                initiative,
            } => format!("i{character}{FIELD}{initiative}"),
            TrackerOp::RemoveCharacter { character } => format!("d{character}"),
            TrackerOp::TakeTurn(turn) => format!(
                "t{}{FIELD}{}",
                turn.item.character,
                turn.predecessor
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            ),
        }
    }

    fn decode_payload(text: &str) -> Result<Self, WireError> {
        let mut chars = text.chars();
        let tag = chars.next().ok_or_else(|| payload_error(text))?;
        let fields: Vec<&str> = chars.as_str().split(FIELD).collect();

        match (tag, fields.as_slice()) {
            ('a', [name, initiative]) => Ok(TrackerOp::AddCharacter {
                name: decode_name(name)?,
                initiative: decode_initiative(initiative)?,
            }),
            ('n', [character, name]) => Ok(TrackerOp::RenameCharacter {
                character: character.parse()?,
                name: decode_name(name)?,
            }),
            ('i', [character, initiative]) => Ok(TrackerOp::SetInitiative {
                character: character.parse()?,
                initiative: decode_initiative(initiative)?,
            }),
            ('d', [character]) => Ok(TrackerOp::RemoveCharacter {
                character: character.parse()?,
            }),
            ('t', [character, predecessor]) => {
                let predecessor = match *predecessor {
                    "" => None,
                    dot => Some(dot.parse::<Dot>()?),
                };
                Ok(TrackerOp::take_turn(character.parse()?, predecessor))
            }
            _ => Err(payload_error(text)),
        }
    }
}
