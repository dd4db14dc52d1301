//! `echo`: resolves with its own (already resolved) configuration.
//!
//! Handy for start/end nodes and for reshaping upstream results through
//! variable references.

use async_trait::async_trait;
use serde_json::Value;

use crate::{ExecutionContext, Instruction, JobResult, NodeError, Step};

pub struct EchoInstruction;

#[async_trait]
impl Instruction for EchoInstruction {
    async fn run(&self, ctx: &ExecutionContext) -> Result<Step, NodeError> {
        let mut output = ctx.config.clone();
        // `ignoreFail` is engine policy, not data.
        if let Value::Object(map) = &mut output {
            map.remove("ignoreFail");
        }
        Ok(Step::Complete(JobResult::resolved(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn echo_returns_config_without_policy_flags() {
        let ctx = ExecutionContext {
            workflow_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            node_id: "start".into(),
            sync: true,
            config: json!({ "greeting": "hi", "ignoreFail": true }),
            trigger: Value::Null,
            upstream: None,
        };

        let step = EchoInstruction.run(&ctx).await.unwrap();
        match step {
            Step::Complete(result) => assert_eq!(result, JobResult::resolved(json!({ "greeting": "hi" }))),
            other => panic!("unexpected step: {other:?}"),
        }
    }
}
