//! `engine` crate: workflow models, DAG validation and the resumable
//! execution engine.

pub mod models;
pub mod error;
pub mod dag;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod processor;
pub mod controller;

pub use models::{Edge, Execution, ExecutionStatus, NodeDefinition, Workflow};
pub use error::EngineError;
pub use dag::{validate_dag, WorkflowGraph};
pub use registry::InstructionRegistry;
pub use store::{DbJobStore, JobStore};
pub use controller::ExecutionController;
