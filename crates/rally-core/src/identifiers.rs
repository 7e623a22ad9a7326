//! Replica identifiers

use crate::errors::RallyError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of random bytes behind a generated client identifier.
const RANDOM_ID_BYTES: usize = 8;

/// Label naming one replica.
///
/// Immutable once created. Only ASCII alphanumerics, `-`, `_` and `.` are
/// accepted so an identifier can never contain a wire delimiter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    /// Validate and wrap an identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, RallyError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RallyError::invalid("client id must not be empty"));
        }
        if let Some(bad) = id.chars().find(|c| !Self::is_allowed(*c)) {
            return Err(RallyError::invalid(format!(
                "client id {id:?} contains disallowed character {bad:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a random hex token, once per process lifetime.
    pub fn random() -> Self {
        let mut bytes = [0u8; RANDOM_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_allowed(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientId {
    type Err = RallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClientId {
    type Error = RallyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_labels() {
        assert_eq!(ClientId::new("alice-1.b_2").unwrap().as_str(), "alice-1.b_2");
    }

    #[test]
    fn rejects_delimiters() {
        for bad in ["", "a:b", "a~b", "a}b", "a%b", "a,b", "a b", "a\nb"] {
            assert!(ClientId::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn random_ids_are_hex_and_distinct() {
        let a = ClientId::random();
        let b = ClientId::random();
        assert_eq!(a.as_str().len(), RANDOM_ID_BYTES * 2);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn serde_validates() {
        let ok: ClientId = serde_json::from_str("\"peer-a\"").unwrap();
        assert_eq!(ok.as_str(), "peer-a");
        assert!(serde_json::from_str::<ClientId>("\"bad:id\"").is_err());
    }
}
