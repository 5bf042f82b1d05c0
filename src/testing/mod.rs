//! Testing utilities and mock implementations
//!
//! In-memory doubles for the row source, the broker, and the remote table.

pub mod mocks;

pub use mocks::*;
