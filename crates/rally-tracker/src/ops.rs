//! Tracker operations

use rally_core::{Dot, GrowingListItem};
use serde::{Deserialize, Serialize};

/// One turn: the character that acted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAction {
    /// Character taking the turn
    pub character: Dot,
}

/// Mutations of a [`crate::TrackerState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerOp {
    /// Add a character; its id is the dot of this operation
    AddCharacter {
        /// Display name
        name: String,
        /// Initiative roll
        initiative: i32,
    },
    /// Change a character's name
    RenameCharacter {
        /// Character id
        character: Dot,
        /// New name
        name: String,
    },
    /// Change a character's initiative
    SetInitiative {
        /// Character id
        character: Dot,
        /// New initiative
        initiative: i32,
    },
    /// Hide a character from the roster
    RemoveCharacter {
        /// Character id
        character: Dot,
    },
    /// Record a turn after the given predecessor turn
    TakeTurn(GrowingListItem<TurnAction>),
}

impl TrackerOp {
    /// Turn for `character` appended after `predecessor`.
    pub fn take_turn(character: Dot, predecessor: Option<Dot>) -> Self {
        TrackerOp::TakeTurn(GrowingListItem::new(TurnAction { character }, predecessor))
    }

    /// Character this operation refers to, if any. `AddCharacter` creates
    /// one rather than referring to it.
    pub fn character(&self) -> Option<&Dot> {
        match self {
            TrackerOp::AddCharacter { .. } => None,
            TrackerOp::RenameCharacter { character, .. }
            | TrackerOp::SetInitiative { character, .. }
            | TrackerOp::RemoveCharacter { character } => Some(character),
            TrackerOp::TakeTurn(turn) => Some(&turn.item.character),
        }
    }
}
