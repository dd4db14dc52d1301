//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the workflow engine (validation, registry,
/// resolution, persistence and the resume protocol).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// A node ID is empty or has characters templates cannot address.
    #[error("node ID '{0}' may only contain ASCII letters, digits, '_' and '-'")]
    InvalidNodeId(String),

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// The designated start node is not part of the workflow.
    #[error("start node '{0}' does not exist")]
    UnknownStartNode(String),

    /// A node cannot be reached from the start node.
    #[error("node '{0}' is not reachable from the start node")]
    UnreachableNode(String),

    // ------ Registry errors ------

    #[error("instruction type '{0}' is already registered")]
    DuplicateInstructionType(String),

    #[error("no instruction registered for type '{0}'")]
    UnknownInstruction(String),

    // ------ Resolution errors ------

    /// A template references a node that has no terminal job in this
    /// execution (not yet executed or not an ancestor).
    #[error("unresolved reference '{reference}': node '{node_id}' has no result in this execution")]
    UnresolvedReference {
        reference: String,
        node_id: String,
    },

    // ------ Protocol errors ------

    /// Resume of a job that is not pending, or whose execution is not
    /// suspended.
    #[error("cannot resume job {job_id}: {reason}")]
    InvalidResume {
        job_id: Uuid,
        reason: String,
    },

    /// Abort of an execution that is not suspended.
    #[error("cannot abort execution {execution_id}: status is {status}")]
    InvalidAbort {
        execution_id: Uuid,
        status: String,
    },

    // ------ Lookup / persistence errors ------

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    /// Stored data that no longer parses into a domain type.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
