pub mod executions;
pub mod jobs;

use engine::Execution;
use nodes::Job;
use serde::Serialize;

/// An execution together with its jobs in creation order.
#[derive(Debug, Serialize)]
pub struct ExecutionView {
    pub execution: Execution,
    pub jobs: Vec<Job>,
}
