//! Reducer: `LbState` + `Action` → `LbState`.
//!
//! 純粋関数として設計されています（副作用なし）。
//! コーディネータは結果をすべて Action に変換してここに流すだけです。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Algorithm, LogEntry, Task, TaskId, TaskStatus};

/// Maximum number of activity-log entries kept, newest first.
pub const LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LbState {
    pub tasks: Vec<Task>,
    pub algorithm: Algorithm,
    pub rr_index: u64,
    /// Newest first.
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Dispatch(Task),
    Complete {
        task_id: TaskId,
        processing_ms: u64,
        completed_at: DateTime<Utc>,
        queue_depth: usize,
        worker: String,
    },
    Fail {
        task_id: TaskId,
        reason: String,
    },
    Retry {
        old_task_id: TaskId,
        new_task: Task,
    },
    SetAlgorithm(Algorithm),
    IncrementIndex,
    Log(LogEntry),
    ClearLog,
}

impl LbState {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }

    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    #[must_use]
    pub fn apply(mut self, action: Action) -> Self {
        match action {
            Action::Dispatch(task) => {
                self.tasks.push(task);
            }
            Action::Complete {
                task_id,
                processing_ms,
                completed_at,
                ..
            } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) {
                    task.status = TaskStatus::Done;
                    task.processing_ms = Some(processing_ms);
                    task.completed_at = Some(completed_at);
                }
            }
            Action::Fail { task_id, reason } => {
                if let Some(task) = self.tasks.iter_mut().find(|t| t.id == task_id) {
                    task.status = TaskStatus::Error;
                    task.error = Some(reason);
                }
            }
            Action::Retry {
                old_task_id,
                new_task,
            } => {
                self.tasks.retain(|t| t.id != old_task_id);
                self.tasks.push(new_task);
            }
            Action::SetAlgorithm(algorithm) => {
                self.algorithm = algorithm;
                self.rr_index = 0;
            }
            Action::IncrementIndex => {
                self.rr_index += 1;
            }
            Action::Log(entry) => {
                self.log.insert(0, entry);
                self.log.truncate(LOG_CAPACITY);
            }
            Action::ClearLog => {
                self.log.clear();
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogId, TaskType, WorkerId};
    use chrono::TimeZone;
    use ulid::Ulid;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn task_id(n: u128) -> TaskId {
        TaskId::from_ulid(Ulid(n))
    }

    fn make_task(n: u128) -> Task {
        Task::pending(task_id(n), TaskType::from("ping"), "ping", WorkerId::from("1"), at(1000))
    }

    fn make_log(n: u128) -> LogEntry {
        LogEntry {
            id: LogId::from_ulid(Ulid(n)),
            text: format!("entry {n}"),
            timestamp: at(1000 + n as i64),
            ok: true,
        }
    }

    #[test]
    fn dispatch_appends_and_keeps_other_state() {
        let state = LbState::default().apply(Action::Dispatch(make_task(1)));
        let state = state.apply(Action::Dispatch(make_task(2)));

        assert_eq!(state.tasks.len(), 2);
        assert_eq!(state.tasks[1].id, task_id(2));
        assert_eq!(state.algorithm, Algorithm::RoundRobin);
        assert_eq!(state.rr_index, 0);
    }

    #[test]
    fn complete_marks_only_matching_task() {
        let state = LbState::default()
            .apply(Action::Dispatch(make_task(1)))
            .apply(Action::Dispatch(make_task(2)))
            .apply(Action::Complete {
                task_id: task_id(1),
                processing_ms: 250,
                completed_at: at(2000),
                queue_depth: 0,
                worker: "worker-1".into(),
            });

        let done = &state.tasks[0];
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.processing_ms, Some(250));
        assert_eq!(done.completed_at, Some(at(2000)));
        assert_eq!(state.tasks[1].status, TaskStatus::Pending);
    }

    #[test]
    fn fail_marks_only_matching_task() {
        let state = LbState::default()
            .apply(Action::Dispatch(make_task(1)))
            .apply(Action::Dispatch(make_task(2)))
            .apply(Action::Fail {
                task_id: task_id(1),
                reason: "overloaded".into(),
            });

        assert_eq!(state.tasks[0].status, TaskStatus::Error);
        assert_eq!(state.tasks[0].error.as_deref(), Some("overloaded"));
        assert_eq!(state.tasks[1].status, TaskStatus::Pending);
    }

    #[test]
    fn unknown_task_id_is_a_no_op() {
        let before = LbState::default().apply(Action::Dispatch(make_task(1)));
        let after = before.clone().apply(Action::Fail {
            task_id: task_id(99),
            reason: "network error".into(),
        });
        assert_eq!(before, after);
    }

    #[test]
    fn retry_replaces_only_the_old_task() {
        let state = LbState::default()
            .apply(Action::Dispatch(make_task(1)))
            .apply(Action::Dispatch(make_task(2)))
            .apply(Action::Dispatch(make_task(3)));

        let replacement = make_task(2).retry_on(task_id(4), WorkerId::from("3"), at(1500));
        let state = state.apply(Action::Retry {
            old_task_id: task_id(2),
            new_task: replacement.clone(),
        });

        let ids: Vec<TaskId> = state.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![task_id(1), task_id(3), task_id(4)]);
        assert_eq!(state.tasks[2], replacement);
        assert!(state.tasks[2].retried);
    }

    #[test]
    fn set_algorithm_resets_index() {
        let state = LbState::default()
            .apply(Action::IncrementIndex)
            .apply(Action::IncrementIndex)
            .apply(Action::IncrementIndex);
        assert_eq!(state.rr_index, 3);

        let state = state.apply(Action::SetAlgorithm(Algorithm::Weighted));
        assert_eq!(state.algorithm, Algorithm::Weighted);
        assert_eq!(state.rr_index, 0);
    }

    #[test]
    fn log_is_newest_first_and_capped() {
        let mut state = LbState::default();
        for n in 1..=55 {
            state = state.apply(Action::Log(make_log(n)));
        }

        assert_eq!(state.log.len(), LOG_CAPACITY);
        assert_eq!(state.log[0].text, "entry 55");
        assert_eq!(state.log[LOG_CAPACITY - 1].text, "entry 6");
    }

    #[test]
    fn clear_log_keeps_tasks() {
        let state = LbState::default()
            .apply(Action::Dispatch(make_task(1)))
            .apply(Action::Log(make_log(1)))
            .apply(Action::ClearLog);

        assert!(state.log.is_empty());
        assert_eq!(state.tasks.len(), 1);
    }
}
