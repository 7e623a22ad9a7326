//! Tracker state and projections

use crate::ops::{TrackerOp, TurnAction};
use rally_core::{
    AbstractState, ConflictState, Dot, GrowingListItem, Operation, OperationMetadata, Register,
};
use rally_journal::Repository;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replicated fields of one character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Display name
    pub name: Register<String>,
    /// Initiative roll
    pub initiative: Register<i32>,
    /// Removal tombstone
    pub removed: Register<bool>,
}

impl Character {
    /// True once any replica removed the character.
    pub fn is_removed(&self) -> bool {
        self.removed.values().any(|removed| *removed)
    }
}

/// One visible row of the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    /// Character id
    pub character: Dot,
    /// Name, with concurrent names joined
    pub name: String,
    /// Every retained initiative, in dot order
    pub initiatives: Vec<i32>,
    /// True when the name or the initiative has unresolved concurrent values
    pub conflicted: bool,
}

/// One row of the projected turn history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnEntry {
    /// Dot of the turn operation
    pub dot: Dot,
    /// Which timelines the turn is on
    pub conflict: ConflictState,
    /// Character that acted
    pub character: Dot,
    /// Character name at projection time, empty if unknown
    pub name: String,
}

/// Replicated initiative tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerState {
    characters: BTreeMap<Dot, Character>,
    turns: Register<GrowingListItem<TurnAction>>,
}

impl TrackerState {
    /// Character by id, including removed ones.
    pub fn character(&self, id: &Dot) -> Option<&Character> {
        self.characters.get(id)
    }

    /// Tips of the turn history.
    pub fn turns(&self) -> &Register<GrowingListItem<TurnAction>> {
        &self.turns
    }

    /// Predecessor for the next turn.
    pub fn last_turn(&self) -> Option<Dot> {
        self.turns.append_point()
    }

    /// Visible characters in creation order.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.characters
            .iter()
            .filter(|(_, character)| !character.is_removed())
            .map(|(id, character)| RosterEntry {
                character: id.clone(),
                name: character.name.text_field(),
                initiatives: character.initiative.values().copied().collect(),
                conflicted: character.name.is_conflicted() || character.initiative.is_conflicted(),
            })
            .collect()
    }

    fn character_mut(&mut self, id: &Dot) -> &mut Character {
        // Causal delivery applies AddCharacter first; a history gap still gets a row.
        self.characters.entry(id.clone()).or_default()
    }
}

/// Insert into `register`, returning the dots it displaced other than `keep`.
fn write<T>(register: &mut Register<T>, value: T, metadata: &OperationMetadata, keep: &Dot) -> Vec<Dot> {
    let before = register.dots();
    register.insert(value, metadata.clone());
    let after = register.dots();
    before
        .into_iter()
        .filter(|dot| dot != keep && !after.contains(dot))
        .collect()
}

impl AbstractState<TrackerOp> for TrackerState {
    fn apply(&mut self, operation: &Operation<TrackerOp>) -> Vec<Dot> {
        let metadata = &operation.metadata;
        match &operation.op {
            TrackerOp::AddCharacter { name, initiative } => {
                let character = self.character_mut(&operation.dot());
                character.name.insert(name.clone(), metadata.clone());
                character.initiative.insert(*initiative, metadata.clone());
                character.removed.insert(false, metadata.clone());
                Vec::new()
            }
            TrackerOp::RenameCharacter { character, name } => {
                let target = self.character_mut(character);
                write(&mut target.name, name.clone(), metadata, character)
            }
            TrackerOp::SetInitiative {
                character,
                initiative,
            } => {
                let target = self.character_mut(character);
                write(&mut target.initiative, *initiative, metadata, character)
            }
            TrackerOp::RemoveCharacter { character } => {
                let target = self.character_mut(character);
                write(&mut target.removed, true, metadata, character)
            }
            TrackerOp::TakeTurn(turn) => {
                if !self.characters.contains_key(&turn.item.character) {
                    tracing::debug!(character = %turn.item.character, "turn for unknown character");
                }
                self.turns.insert(turn.clone(), metadata.clone());
                Vec::new()
            }
        }
    }

    fn predecessors(op: &TrackerOp) -> Vec<Dot> {
        let mut predecessors: Vec<Dot> = op.character().into_iter().cloned().collect();
        if let TrackerOp::TakeTurn(turn) = op {
            predecessors.extend(turn.predecessor.iter().cloned());
        }
        predecessors
    }
}

/// Project the turn history stored in `repository`, oldest first.
pub fn turn_history(repository: &Repository<TrackerOp, TrackerState>) -> Vec<TurnEntry> {
    repository.read(|snapshot| {
        let state = snapshot.state();
        state
            .turns
            .show(|dot| {
                let operation = snapshot.fetch_version(dot)?;
                match &operation.op {
                    TrackerOp::TakeTurn(turn) => Some((turn.clone(), operation.metadata.clone())),
                    _ => None,
                }
            })
            .into_iter()
            .map(|entry| TurnEntry {
                name: state
                    .character(&entry.item.character)
                    .map(|character| character.name.text_field())
                    .unwrap_or_default(),
                dot: entry.dot,
                conflict: entry.conflict,
                character: entry.item.character,
            })
            .collect()
    })
}
