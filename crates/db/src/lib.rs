//! `db` crate: persistence of workflows, executions and jobs.
//!
//! A SQLite connection pool, row structs and repository functions. No
//! business logic lives here.

pub mod error;
pub mod pool;
pub mod repository;
pub mod models;

pub use pool::DbPool;
pub use error::DbError;
