//! Stdin command language
//!
//! One command per line. Characters are addressed by the dot of the
//! operation that added them, as printed by `roster`.

use rally_core::{ConflictState, Dot, VectorClock, WireError};
use rally_tracker::{turn_history, TrackerOp, TrackerRepository};
use std::fmt::Write as _;
use std::str::FromStr;

/// Text printed by `help`.
pub const HELP: &str = "\
commands:
  add NAME INIT      add a character
  rename DOT NAME    rename a character
  init DOT N         set a character's initiative
  remove DOT         remove a character
  turn DOT           record a turn for a character
  roster             list characters
  turns              show the turn history
  clock              show the local version
  quit               stop syncing and exit";

/// Command parse and execution failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Unrecognized command word
    #[error("unknown command {0:?}, try `help`")]
    Unknown(String),

    /// Wrong arguments for a known command
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Number argument failed to parse
    #[error("not a number: {0:?}")]
    InvalidNumber(String),

    /// Character argument is not a dot
    #[error("not a character id: {0}")]
    InvalidDot(#[from] WireError),

    /// No character was added with this dot
    #[error("no character {0}")]
    UnknownCharacter(Dot),
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add a character
    Add {
        /// Display name, may contain spaces
        name: String,
        /// Initiative roll
        initiative: i32,
    },
    /// Rename a character
    Rename {
        /// Character id
        character: Dot,
        /// New name
        name: String,
    },
    /// Set a character's initiative
    Init {
        /// Character id
        character: Dot,
        /// New initiative
        initiative: i32,
    },
    /// Remove a character
    Remove {
        /// Character id
        character: Dot,
    },
    /// Record a turn
    Turn {
        /// Character id
        character: Dot,
    },
    /// Print the roster
    Roster,
    /// Print the turn history
    Turns,
    /// Print the local clock
    Clock,
    /// Print the command list
    Help,
    /// Exit
    Quit,
}

fn number(text: &str) -> Result<i32, CommandError> {
    text.parse()
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Err(CommandError::Usage("help"));
        };

        match (verb, args) {
            ("add", [name @ .., initiative]) if !name.is_empty() => Ok(Command::Add {
                name: name.join(" "),
                initiative: number(initiative)?,
            }),
            ("add", _) => Err(CommandError::Usage("add NAME INIT")),
            ("rename", [character, name @ ..]) if !name.is_empty() => Ok(Command::Rename {
                character: character.parse()?,
                name: name.join(" "),
            }),
            ("rename", _) => Err(CommandError::Usage("rename DOT NAME")),
            ("init", [character, initiative]) => Ok(Command::Init {
                character: character.parse()?,
                initiative: number(initiative)?,
            }),
            ("init", _) => Err(CommandError::Usage("init DOT N")),
            ("remove", [character]) => Ok(Command::Remove {
                character: character.parse()?,
            }),
            ("remove", _) => Err(CommandError::Usage("remove DOT")),
            ("turn", [character]) => Ok(Command::Turn {
                character: character.parse()?,
            }),
            ("turn", _) => Err(CommandError::Usage("turn DOT")),
            ("roster", []) => Ok(Command::Roster),
            ("turns", []) => Ok(Command::Turns),
            ("clock", []) => Ok(Command::Clock),
            ("help", []) => Ok(Command::Help),
            ("quit" | "exit", []) => Ok(Command::Quit),
            (other, _) => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl Command {
    /// Run against the local replica and return the text to print.
    pub fn execute(&self, repository: &TrackerRepository) -> Result<String, CommandError> {
        match self {
            Command::Add { name, initiative } => {
                let clock = repository.produce([TrackerOp::AddCharacter {
                    name: name.clone(),
                    initiative: *initiative,
                }]);
                let id = Dot::new(repository.client().clone(), clock.get(repository.client()));
                Ok(format!("added {name} as {id}"))
            }
            Command::Rename { character, name } => {
                require_character(repository, character)?;
                repository.produce([TrackerOp::RenameCharacter {
                    character: character.clone(),
                    name: name.clone(),
                }]);
                Ok(format!("renamed {character}"))
            }
            Command::Init {
                character,
                initiative,
            } => {
                require_character(repository, character)?;
                repository.produce([TrackerOp::SetInitiative {
                    character: character.clone(),
                    initiative: *initiative,
                }]);
                Ok(format!("set initiative of {character}"))
            }
            Command::Remove { character } => {
                require_character(repository, character)?;
                repository.produce([TrackerOp::RemoveCharacter {
                    character: character.clone(),
                }]);
                Ok(format!("removed {character}"))
            }
            Command::Turn { character } => {
                require_character(repository, character)?;
                let predecessor = repository.read(|snapshot| snapshot.state().last_turn());
                repository.produce([TrackerOp::take_turn(character.clone(), predecessor)]);
                Ok(format!("turn recorded for {character}"))
            }
            Command::Roster => Ok(render_roster(repository)),
            Command::Turns => Ok(render_turns(repository)),
            Command::Clock => Ok(render_clock(&repository.current_version())),
            Command::Help => Ok(HELP.to_string()),
            Command::Quit => Ok(String::new()),
        }
    }
}

fn require_character(repository: &TrackerRepository, character: &Dot) -> Result<(), CommandError> {
    let known = repository.read(|snapshot| snapshot.state().character(character).is_some());
    if known {
        Ok(())
    } else {
        Err(CommandError::UnknownCharacter(character.clone()))
    }
}

fn render_roster(repository: &TrackerRepository) -> String {
    let roster = repository.read(|snapshot| snapshot.state().roster());
    if roster.is_empty() {
        return "(no characters)".to_string();
    }
    let mut out = String::new();
    for entry in roster {
        let initiatives: Vec<String> = entry.initiatives.iter().map(i32::to_string).collect();
        let marker = if entry.conflicted { " !" } else { "" };
        let _ = writeln!(
            out,
            "{:<12} {:<24} {}{marker}",
            entry.character.to_string(),
            entry.name,
            initiatives.join("/")
        );
    }
    out.truncate(out.trim_end().len());
    out
}

fn render_turns(repository: &TrackerRepository) -> String {
    let history = turn_history(repository);
    if history.is_empty() {
        return "(no turns)".to_string();
    }
    let mut out = String::new();
    for entry in history {
        let timelines = match &entry.conflict {
            ConflictState::InAllTimelines => String::new(),
            ConflictState::InTimelines(set) => {
                let ids: Vec<String> = set.iter().map(usize::to_string).collect();
                format!(" [{}]", ids.join(","))
            }
        };
        let name = if entry.name.is_empty() {
            entry.character.to_string()
        } else {
            entry.name
        };
        let _ = writeln!(out, "{:<12} {name}{timelines}", entry.dot.to_string());
    }
    out.truncate(out.trim_end().len());
    out
}

fn render_clock(clock: &VectorClock) -> String {
    if clock.is_empty() {
        "(empty)".to_string()
    } else {
        clock.to_string()
    }
}
