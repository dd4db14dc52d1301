//! `nodes` crate: the `Instruction` contract and built-in instructions.
//!
//! Every node type, built-in or plugin, implements [`Instruction`].
//! The engine crate dispatches execution through this trait object.

pub mod echo;
pub mod error;
pub mod job;
pub mod mock;
pub mod request;
pub mod traits;

pub use echo::EchoInstruction;
pub use error::NodeError;
pub use job::{Job, JobResult, JobStatus};
pub use request::RequestInstruction;
pub use traits::{Deferred, ExecutionContext, Instruction, Step};
