//! Test operation and state

use rally_core::{AbstractState, Dot, GrowingListItem, Operation, PayloadCodec, Register, WireError};

/// Operations of the test application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOp {
    /// Overwrite the scalar value
    Write(String),
    /// Append to the log
    Append(GrowingListItem<String>),
}

impl TestOp {
    /// Append `item` after `predecessor`.
    pub fn append(item: &str, predecessor: Option<Dot>) -> Self {
        TestOp::Append(GrowingListItem::new(item.to_string(), predecessor))
    }

    /// Write `value`.
    pub fn write(value: &str) -> Self {
        TestOp::Write(value.to_string())
    }
}

/// State of the test application: one scalar register and one growing list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestState {
    /// Scalar value
    pub value: Register<String>,
    /// Tips of the log
    pub log: Register<GrowingListItem<String>>,
    /// Number of operations applied
    pub applied: u64,
}

impl AbstractState<TestOp> for TestState {
    fn apply(&mut self, operation: &Operation<TestOp>) -> Vec<Dot> {
        self.applied += 1;
        match &operation.op {
            TestOp::Write(value) => {
                let before = self.value.dots();
                self.value.insert(value.clone(), operation.metadata.clone());
                let after = self.value.dots();
                before.into_iter().filter(|dot| !after.contains(dot)).collect()
            }
            TestOp::Append(item) => {
                self.log.insert(item.clone(), operation.metadata.clone());
                Vec::new()
            }
        }
    }

    fn predecessors(op: &TestOp) -> Vec<Dot> {
        match op {
            TestOp::Write(_) => Vec::new(),
            TestOp::Append(item) => item.predecessor.iter().cloned().collect(),
        }
    }
}

impl PayloadCodec for TestOp {
    fn encode_payload(&self) -> String {
        match self {
            TestOp::Write(value) => format!("w{}", hex::encode(value)),
            TestOp::Append(item) => format!(
                "a{},{}",
                hex::encode(&item.item),
                item.predecessor.as_ref().map(ToString::to_string).unwrap_or_default()
            ),
        }
    }

    fn decode_payload(text: &str) -> Result<Self, WireError> {
        let hex_text = |field: &str| {
            hex::decode(field)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| WireError::Payload(format!("bad text field {field:?}")))
        };

        if let Some(value) = text.strip_prefix('w') {
            return Ok(TestOp::Write(hex_text(value)?));
        }
        let body = text
            .strip_prefix('a')
            .ok_or_else(|| WireError::Payload(format!("unknown test op {text:?}")))?;
        let (item, predecessor) = body
            .split_once(',')
            .ok_or_else(|| WireError::Payload(format!("bad append {text:?}")))?;
        let predecessor = match predecessor {
            "" => None,
            dot => Some(dot.parse::<Dot>()?),
        };
        Ok(TestOp::Append(GrowingListItem::new(hex_text(item)?, predecessor)))
    }
}
