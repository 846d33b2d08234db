//! Task and activity-log records as seen by the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LogId, TaskId, TaskType, WorkerId};

/// Task status.
///
/// State transitions:
/// - Pending -> Done
/// - Pending -> Error
/// - Pending -> (removed by a retry; the replacement starts its own lifecycle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

/// One routed attempt of a simulated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub label: String,
    pub worker_id: WorkerId,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_ms: Option<u64>,
    #[serde(default)]
    pub retried: bool,
    /// Failure reason once the task is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn pending(
        id: TaskId,
        task_type: TaskType,
        label: impl Into<String>,
        worker_id: WorkerId,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_type,
            label: label.into(),
            worker_id,
            status: TaskStatus::Pending,
            submitted_at,
            completed_at: None,
            processing_ms: None,
            retried: false,
            error: None,
        }
    }

    /// Fresh pending copy of this task bound to `worker_id`, marked as a retry.
    pub fn retry_on(&self, id: TaskId, worker_id: WorkerId, submitted_at: DateTime<Utc>) -> Self {
        Self {
            retried: true,
            ..Self::pending(id, self.task_type.clone(), self.label.clone(), worker_id, submitted_at)
        }
    }
}

/// Immutable line in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub ok: bool,
}
