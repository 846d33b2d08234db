//! Wire bodies for `POST /worker/{workerId}`.
//!
//! Field names are camelCase on the wire (`taskId`, `processingMs`, ...).

use serde::{Deserialize, Serialize};

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub task_id: String,
    #[serde(rename = "type")]
    pub task_type: String,
}

/// 200 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCompleted {
    pub task_id: String,
    /// `worker-{id}`
    pub worker: String,
    pub processing_ms: u64,
    /// Epoch millis.
    pub completed_at: i64,
    /// In-flight count after this task's decrement.
    pub queue_depth: usize,
}

/// 503 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOverloaded {
    /// Always `"overloaded"`.
    pub error: String,
    pub worker: String,
    pub task_id: String,
}

impl WorkerOverloaded {
    pub const ERROR: &'static str = "overloaded";

    pub fn new(worker: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            error: Self::ERROR.to_string(),
            worker: worker.into(),
            task_id: task_id.into(),
        }
    }
}

/// What a worker answered for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Completed(WorkerCompleted),
    Overloaded(WorkerOverloaded),
}
