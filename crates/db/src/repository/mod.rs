//! Repository functions, one per statement.
//!
//! All take a `&DbPool` and return `Result<T, DbError>`. Status columns are
//! plain strings here; the engine owns their meaning. Conditional updates
//! report whether a row matched so callers can detect lost races.

pub mod workflows;
pub mod executions;
pub mod jobs;
