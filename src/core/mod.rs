// This module gathers the infrastructure every other part of the lowering pass leans on:
// the error type with its result alias, and the arena-backed session that owns per-invocation
// scratch data and statistics.

//! Core infrastructure: errors and the lowering session.

pub mod error;
pub mod session;

pub use error::{LowerError, LowerResult};
pub use session::{LoweringSession, SessionStats};
