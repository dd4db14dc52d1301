//! Core domain models for the workflow engine.
//!
//! A [`Workflow`] can be serialised to/from the JSON `definition` column of
//! the `workflows` table. Jobs are defined in the `nodes` crate so
//! instructions can see them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges and by
    /// `{{ $jobs.<id> }}` templates).
    pub id: String,
    /// Maps to a registered `Instruction` implementation.
    #[serde(rename = "type")]
    pub instruction: String,
    /// Arbitrary configuration, resolved against upstream results before
    /// the instruction runs.
    #[serde(default)]
    pub config: Value,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, instruction: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            instruction: instruction.into(),
            config,
        }
    }

    /// Whether this node's own failure should not halt the execution.
    pub fn ignore_fail(&self) -> bool {
        self.config
            .get("ignoreFail")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete, immutable workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    /// A synchronous workflow runs to completion in one call and may not
    /// suspend.
    #[serde(default)]
    pub sync: bool,
    /// ID of the node the walk starts from.
    pub start: String,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    /// Convenience constructor; the first node is the start node.
    pub fn new(name: impl Into<String>, sync: bool, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        let start = nodes.first().map(|n| n.id.clone()).unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sync,
            start,
            nodes,
            edges,
        }
    }

    /// Build a linear chain `ids[0] → ids[1] → …`, every node of `instruction`.
    pub fn linear(name: impl Into<String>, sync: bool, instruction: &str, ids: &[&str]) -> Self {
        let nodes = ids
            .iter()
            .map(|id| NodeDefinition::new(*id, instruction, Value::Null))
            .collect();
        let edges = ids.windows(2).map(|w| Edge::new(w[0], w[1])).collect();
        Self::new(name, sync, nodes, edges)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Persisted execution status.
///
/// `Running` and `Suspended` together are the live phase: `Running` while a
/// processor is advancing the walk, `Suspended` while the execution waits on
/// a pending job. Every other status is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Suspended,
    Resolved,
    Failed,
    Error,
    Aborted,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running | Self::Suspended)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running   => write!(f, "running"),
            Self::Suspended => write!(f, "suspended"),
            Self::Resolved  => write!(f, "resolved"),
            Self::Failed    => write!(f, "failed"),
            Self::Error     => write!(f, "error"),
            Self::Aborted   => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running"   => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "resolved"  => Ok(Self::Resolved),
            "failed"    => Ok(Self::Failed),
            "error"     => Ok(Self::Error),
            "aborted"   => Ok(Self::Aborted),
            other       => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One run of a workflow triggered by an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// Trigger payload, addressable as `{{ $context.<path> }}`.
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn node_type_is_serialized_as_type() {
        let node: NodeDefinition =
            serde_json::from_value(json!({ "id": "a", "type": "echo", "config": { "ignoreFail": true } }))
                .unwrap();
        assert_eq!(node.instruction, "echo");
        assert!(node.ignore_fail());
        assert!(!NodeDefinition::new("b", "echo", Value::Null).ignore_fail());
    }

    #[test]
    fn workflow_defaults_to_async_without_edges() {
        let wf: Workflow = serde_json::from_value(json!({
            "id": Uuid::nil(),
            "name": "solo",
            "start": "a",
            "nodes": [{ "id": "a", "type": "echo" }]
        }))
        .unwrap();
        assert!(!wf.sync);
        assert!(wf.edges.is_empty());
        assert_eq!(wf.nodes[0].config, Value::Null);
    }

    #[test]
    fn execution_status_terminality() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Suspended.is_terminal());
        for status in [
            ExecutionStatus::Resolved,
            ExecutionStatus::Failed,
            ExecutionStatus::Error,
            ExecutionStatus::Aborted,
        ] {
            assert!(status.is_terminal());
            assert_eq!(status.to_string().parse::<ExecutionStatus>(), Ok(status));
        }
    }
}
