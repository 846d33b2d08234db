//! Derived, non-stored views over `LbState`.
//!
//! Presentation policy only: nothing here feeds back into the reducer.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::LbState;
use crate::domain::{Task, TaskStatus, WorkerId};
use crate::routing::WorkerPool;

/// How long a finished task stays visible, in milliseconds.
pub const DEFAULT_VISIBLE_WINDOW_MS: i64 = 3000;

/// Pending and failed tasks are always visible; done tasks only for `window`
/// after completion.
pub fn is_visible(task: &Task, now: DateTime<Utc>, window: Duration) -> bool {
    match task.status {
        TaskStatus::Pending | TaskStatus::Error => true,
        TaskStatus::Done => task
            .completed_at
            .is_some_and(|completed_at| now - completed_at < window),
    }
}

/// Visible tasks grouped per worker, every pool worker present.
pub fn visible_by_worker<'a>(
    state: &'a LbState,
    pool: &WorkerPool,
    now: DateTime<Utc>,
    window: Duration,
) -> BTreeMap<WorkerId, Vec<&'a Task>> {
    let mut grouped: BTreeMap<WorkerId, Vec<&Task>> =
        pool.ids().iter().map(|id| (id.clone(), Vec::new())).collect();
    for task in state.tasks.iter().filter(|t| is_visible(t, now, window)) {
        if let Some(bucket) = grouped.get_mut(&task.worker_id) {
            bucket.push(task);
        }
    }
    grouped
}

/// Number of pending tasks per pool worker.
pub fn pending_counts(state: &LbState, pool: &WorkerPool) -> BTreeMap<WorkerId, usize> {
    pool.ids()
        .iter()
        .map(|id| {
            let count = state
                .tasks
                .iter()
                .filter(|t| &t.worker_id == id && t.status == TaskStatus::Pending)
                .count();
            (id.clone(), count)
        })
        .collect()
}
