//! Causality model: vector clocks, dots and per-operation metadata.

mod clock;
mod dot;
mod operation;

pub use clock::{ClockOrdering, VectorClock};
pub use dot::Dot;
pub use operation::{Operation, OperationMetadata};
