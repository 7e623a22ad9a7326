//! Rally Testing Infrastructure
//!
//! Shared fixtures for tests across the workspace:
//!
//! - [`fixtures`]: a small operation/state pair exercising both a scalar
//!   register and a growing list
//! - [`strategies`]: proptest strategies for identifiers, clocks and
//!   well-formed histories
//! - [`replica`]: repository builders and helpers to sync replicas by hand
//!   or over in-memory sessions
//!
//! # Usage
//!
//! Add this to a crate's `Cargo.toml` dev-dependencies and use it from the
//! crate's `tests/` directory:
//! ```toml
//! [dev-dependencies]
//! rally-testkit = { workspace = true }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod replica;
pub mod strategies;

pub use fixtures::{TestOp, TestState};
pub use replica::*;
