//! `MockInstruction`, a test double for `Instruction`.
//!
//! Useful in engine tests where a real instruction is either unavailable or
//! irrelevant. One instance can serve many nodes; per-node behaviour is
//! configured with [`MockInstruction::with_node`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{ExecutionContext, Instruction, Job, JobResult, NodeError, Step};

/// Behaviour injected into `MockInstruction` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Resolve with `{ "node": <id> }` merged with this value.
    ReturnValue(Value),
    /// Complete with a `failed` job carrying this detail.
    Fail(Value),
    /// Return `NodeError::Runtime`.
    Error(String),
    /// Return `NodeError::InvalidConfig`.
    InvalidConfig(String),
    /// Suspend and wait for an external `resume`.
    Suspend,
    /// Suspend with deferred work that yields this outcome.
    Defer(JobResult),
}

/// One recorded `run` or `resume` call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub node_id: String,
    /// Resolved config seen by the instruction.
    pub config: Value,
    pub upstream_node: Option<String>,
    pub resumed: bool,
    pub at: DateTime<Utc>,
}

/// A mock instruction that records every call it receives and behaves as
/// the test programmed it to.
pub struct MockInstruction {
    default: MockBehaviour,
    per_node: HashMap<String, MockBehaviour>,
    /// All calls seen by this instruction (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockInstruction {
    pub fn new(default: MockBehaviour) -> Self {
        Self {
            default,
            per_node: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that resolves every node with an empty payload.
    pub fn resolving() -> Self {
        Self::new(MockBehaviour::ReturnValue(json!({})))
    }

    /// Override the behaviour for one node.
    pub fn with_node(mut self, node_id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.per_node.insert(node_id.into(), behaviour);
        self
    }

    /// Node ids whose `run` was called, in call order.
    pub fn run_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| !call.resumed)
            .map(|call| call.node_id.clone())
            .collect()
    }

    /// Number of `run` calls for the given node.
    pub fn run_count(&self, node_id: &str) -> usize {
        self.run_order().iter().filter(|id| *id == node_id).count()
    }

    /// Number of `resume` calls for the given node.
    pub fn resume_count(&self, node_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.resumed && call.node_id == node_id)
            .count()
    }

    /// The first recorded call for a node.
    pub fn call_for(&self, node_id: &str) -> Option<MockCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|call| call.node_id == node_id)
            .cloned()
    }

    fn record(&self, ctx: &ExecutionContext, resumed: bool) {
        self.calls.lock().unwrap().push(MockCall {
            node_id: ctx.node_id.clone(),
            config: ctx.config.clone(),
            upstream_node: ctx.upstream.as_ref().map(|job| job.node_id.clone()),
            resumed,
            at: Utc::now(),
        });
    }

    fn behaviour_for(&self, node_id: &str) -> &MockBehaviour {
        self.per_node.get(node_id).unwrap_or(&self.default)
    }
}

#[async_trait]
impl Instruction for MockInstruction {
    async fn run(&self, ctx: &ExecutionContext) -> Result<Step, NodeError> {
        self.record(ctx, false);

        match self.behaviour_for(&ctx.node_id) {
            MockBehaviour::ReturnValue(v) => {
                // Tag the output with the node id so tests can trace data
                // flowing through the graph.
                let mut out = json!({ "node": ctx.node_id });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(Step::Complete(JobResult::resolved(out)))
            }
            MockBehaviour::Fail(detail) => Ok(Step::Complete(JobResult::failed(detail.clone()))),
            MockBehaviour::Error(msg) => Err(NodeError::Runtime(msg.clone())),
            MockBehaviour::InvalidConfig(msg) => Err(NodeError::InvalidConfig(msg.clone())),
            MockBehaviour::Suspend => Ok(Step::suspend()),
            MockBehaviour::Defer(outcome) => {
                let outcome = outcome.clone();
                Ok(Step::defer(async move { outcome }))
            }
        }
    }

    async fn resume(
        &self,
        ctx: &ExecutionContext,
        _job: &Job,
        outcome: JobResult,
    ) -> Result<JobResult, NodeError> {
        self.record(ctx, true);
        Ok(outcome)
    }
}
