//! DispatchCoordinator - 振り分け・リトライ・状態遷移
//!
//! # 設計原則
//! - 状態の変更はすべて `Action` として reducer に流す（`emit`）
//! - Mutex は同期区間でのみ取得し、`.await` をまたいで保持しない
//! - overload は 1 回だけ別 worker に retry する（判断は `RetryDecider`）
//! - transport エラーは retry しない
//!
//! `submit` 自体はエラーを返しません。結果は `LbState` と `DispatchReport` に残ります。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::builder::CoordinatorBuilder;
use super::retry::{Decision, RetryDecider};
use crate::domain::{
    Algorithm, LogEntry, SubmitOutcome, Task, TaskId, TaskStatus, TaskType, WorkerId,
    WorkerRequest,
};
use crate::ports::{Clock, IdGenerator, WorkerTransport};
use crate::routing::WorkerPool;
use crate::store::{self, Action, LbState};

const OVERLOADED: &str = "overloaded";
const NETWORK_ERROR: &str = "network error";

/// Final result of one `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Id of the task that is left in the state (the retry task after a retry).
    pub task_id: TaskId,
    pub worker: WorkerId,
    pub status: TaskStatus,
    pub retried: bool,
    pub attempts: u32,
}

pub struct DispatchCoordinator {
    transport: Arc<dyn WorkerTransport>,
    pool: WorkerPool,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    decider: RetryDecider,
    visible_window: Duration,
    state: Mutex<LbState>,
    /// Local view of outstanding calls, used by least-connections.
    in_flight: Mutex<HashMap<WorkerId, usize>>,
    rng: Mutex<StdRng>,
}

impl DispatchCoordinator {
    pub fn builder(transport: Arc<dyn WorkerTransport>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(transport)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        transport: Arc<dyn WorkerTransport>,
        pool: WorkerPool,
        algorithm: Algorithm,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        decider: RetryDecider,
        rng: StdRng,
        visible_window: Duration,
    ) -> Self {
        let in_flight = pool.ids().iter().map(|id| (id.clone(), 0)).collect();
        Self {
            transport,
            pool,
            clock,
            ids,
            decider,
            visible_window,
            state: Mutex::new(LbState::new(algorithm)),
            in_flight: Mutex::new(in_flight),
            rng: Mutex::new(rng),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Switches algorithm and resets the rotation index.
    pub fn set_algorithm(&self, algorithm: Algorithm) {
        info!(algorithm = algorithm.name(), "algorithm changed");
        self.emit([Action::SetAlgorithm(algorithm)]);
    }

    pub fn clear_log(&self) {
        self.emit([Action::ClearLog]);
    }

    pub fn snapshot(&self) -> LbState {
        self.state.lock().clone()
    }

    pub fn local_in_flight(&self) -> HashMap<WorkerId, usize> {
        self.in_flight.lock().clone()
    }

    /// Tasks to show per worker at the current clock time.
    pub fn visible_tasks_by_worker(&self) -> BTreeMap<WorkerId, Vec<Task>> {
        let now = self.clock.now();
        let state = self.state.lock();
        store::visible_by_worker(&state, &self.pool, now, self.visible_window)
            .into_iter()
            .map(|(worker, tasks)| (worker, tasks.into_iter().cloned().collect()))
            .collect()
    }

    pub fn pending_counts(&self) -> BTreeMap<WorkerId, usize> {
        store::pending_counts(&self.state.lock(), &self.pool)
    }

    /// Runs `submit` on its own tokio task.
    pub fn spawn_submit(
        self: &Arc<Self>,
        task_type: TaskType,
        label: impl Into<String>,
    ) -> JoinHandle<DispatchReport> {
        let coordinator = Arc::clone(self);
        let label = label.into();
        tokio::spawn(async move { coordinator.submit(task_type, label).await })
    }

    /// Dispatches one task and drives it to a terminal state, retrying once
    /// on overload.
    pub async fn submit(&self, task_type: TaskType, label: impl Into<String>) -> DispatchReport {
        let mut task = self.dispatch(task_type, label.into());
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let worker = task.worker_id.clone();
            let request = WorkerRequest {
                task_id: task.id.to_string(),
                task_type: task.task_type.to_string(),
            };

            self.adjust_in_flight(&worker, true);
            let result = self.transport.submit(&worker, request).await;
            self.adjust_in_flight(&worker, false);

            let retry_suffix = if task.retried { " (retry)" } else { "" };
            match result {
                Ok(SubmitOutcome::Completed(body)) => {
                    let completed_at = DateTime::<Utc>::from_timestamp_millis(body.completed_at)
                        .unwrap_or_else(|| self.clock.now());
                    let text = format!(
                        "→ {} → {}{} → 200 OK in {:.2}s",
                        task.label,
                        worker.label(),
                        retry_suffix,
                        body.processing_ms as f64 / 1000.0
                    );
                    info!(
                        task_id = %task.id,
                        worker = %worker,
                        processing_ms = body.processing_ms,
                        queue_depth = body.queue_depth,
                        "task completed"
                    );
                    self.emit([
                        Action::Complete {
                            task_id: task.id,
                            processing_ms: body.processing_ms,
                            completed_at,
                            queue_depth: body.queue_depth,
                            worker: body.worker,
                        },
                        self.log(text, true),
                    ]);
                    return self.report(&task, TaskStatus::Done, attempts);
                }
                Ok(SubmitOutcome::Overloaded(_)) => {
                    let fail = Action::Fail {
                        task_id: task.id,
                        reason: OVERLOADED.to_string(),
                    };
                    let decision = {
                        let mut rng = self.rng.lock();
                        self.decider
                            .decide(&self.pool, &worker, attempts - 1, &mut *rng)
                    };

                    match decision {
                        Decision::RetryOn(fallback) => {
                            let retry = task.retry_on(
                                self.ids.generate_task_id(),
                                fallback.clone(),
                                self.clock.now(),
                            );
                            warn!(
                                task_id = %task.id,
                                retry_task_id = %retry.id,
                                worker = %worker,
                                fallback = %fallback,
                                "worker overloaded, retrying"
                            );
                            let text = format!(
                                "→ {} → {} → 503 overloaded → retrying on {}",
                                task.label,
                                worker.label(),
                                fallback.label()
                            );
                            self.emit([
                                fail,
                                Action::Retry {
                                    old_task_id: task.id,
                                    new_task: retry.clone(),
                                },
                                self.log(text, false),
                            ]);
                            task = retry;
                        }
                        Decision::GiveUp { reason } => {
                            warn!(task_id = %task.id, worker = %worker, reason, "worker overloaded, giving up");
                            let text = format!(
                                "→ {} → {}{} → 503 overloaded",
                                task.label,
                                worker.label(),
                                retry_suffix
                            );
                            self.emit([fail, self.log(text, false)]);
                            return self.report(&task, TaskStatus::Error, attempts);
                        }
                    }
                }
                Err(err) => {
                    error!(task_id = %task.id, worker = %worker, error = %err, "transport failure");
                    let text = format!("→ {} → network error", worker.label());
                    self.emit([
                        Action::Fail {
                            task_id: task.id,
                            reason: NETWORK_ERROR.to_string(),
                        },
                        self.log(text, false),
                    ]);
                    return self.report(&task, TaskStatus::Error, attempts);
                }
            }
        }
    }

    /// Selects a worker and records the pending task in one critical section.
    fn dispatch(&self, task_type: TaskType, label: String) -> Task {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let algorithm = state.algorithm;

        let worker = {
            let in_flight = self.in_flight.lock();
            self.pool
                .select(algorithm, state.rr_index, &in_flight)
                .clone()
        };
        let task = Task::pending(self.ids.generate_task_id(), task_type, label, worker, now);

        info!(
            task_id = %task.id,
            worker = %task.worker_id,
            algorithm = algorithm.name(),
            rr_index = state.rr_index,
            "task dispatched"
        );

        let text = format!(
            "→ {} dispatched → {} ({})",
            task.label,
            task.worker_id.label(),
            algorithm.label()
        );
        let mut actions = Vec::with_capacity(3);
        if algorithm.consumes_index() {
            actions.push(Action::IncrementIndex);
        }
        actions.push(Action::Dispatch(task.clone()));
        actions.push(self.log(text, true));

        let mut next = std::mem::take(&mut *state);
        for action in actions {
            next = next.apply(action);
        }
        *state = next;
        task
    }

    fn emit(&self, actions: impl IntoIterator<Item = Action>) {
        let mut state = self.state.lock();
        let mut next = std::mem::take(&mut *state);
        for action in actions {
            next = next.apply(action);
        }
        *state = next;
    }

    fn log(&self, text: String, ok: bool) -> Action {
        Action::Log(LogEntry {
            id: self.ids.generate_log_id(),
            text,
            timestamp: self.clock.now(),
            ok,
        })
    }

    fn adjust_in_flight(&self, worker: &WorkerId, increment: bool) {
        let mut in_flight = self.in_flight.lock();
        let count = in_flight.entry(worker.clone()).or_insert(0);
        if increment {
            *count += 1;
        } else {
            *count = count.saturating_sub(1);
        }
    }

    fn report(&self, task: &Task, status: TaskStatus, attempts: u32) -> DispatchReport {
        DispatchReport {
            task_id: task.id,
            worker: task.worker_id.clone(),
            status,
            retried: task.retried,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{WorkerCompleted, WorkerOverloaded};
    use crate::ports::{FixedClock, TransportError, UlidGenerator};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rstest::rstest;
    use std::collections::HashSet;

    const T0_MS: i64 = 1_700_000_000_000;

    /// Answers from a fixed script: overloaded or unreachable workers,
    /// every other worker completes after `latency_ms` of (paused) time.
    #[derive(Default)]
    struct ScriptedTransport {
        overloaded: HashSet<WorkerId>,
        unreachable: HashSet<WorkerId>,
        latency_ms: u64,
        calls: Mutex<Vec<(WorkerId, WorkerRequest)>>,
    }

    impl ScriptedTransport {
        fn overloaded(workers: &[&str]) -> Self {
            Self {
                overloaded: workers.iter().map(|w| WorkerId::from(*w)).collect(),
                ..Self::default()
            }
        }

        fn unreachable(workers: &[&str]) -> Self {
            Self {
                unreachable: workers.iter().map(|w| WorkerId::from(*w)).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(WorkerId, WorkerRequest)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl WorkerTransport for ScriptedTransport {
        async fn submit(
            &self,
            worker: &WorkerId,
            request: WorkerRequest,
        ) -> Result<SubmitOutcome, TransportError> {
            self.calls.lock().push((worker.clone(), request.clone()));
            if self.latency_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
            }
            if self.unreachable.contains(worker) {
                return Err(TransportError::Unreachable {
                    worker: worker.clone(),
                    reason: "connection refused".into(),
                });
            }
            if self.overloaded.contains(worker) {
                return Ok(SubmitOutcome::Overloaded(WorkerOverloaded::new(
                    worker.label(),
                    request.task_id,
                )));
            }
            Ok(SubmitOutcome::Completed(WorkerCompleted {
                task_id: request.task_id,
                worker: worker.label(),
                processing_ms: 250,
                completed_at: T0_MS + 250,
                queue_depth: 0,
            }))
        }
    }

    fn coordinator_with(
        transport: Arc<ScriptedTransport>,
        algorithm: Algorithm,
    ) -> (DispatchCoordinator, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.timestamp_millis_opt(T0_MS).unwrap()));
        let coordinator = DispatchCoordinator::builder(transport)
            .algorithm(algorithm)
            .clock(clock.clone())
            .id_generator(Arc::new(UlidGenerator::new(clock.clone())))
            .seed(7)
            .build()
            .unwrap();
        (coordinator, clock)
    }

    fn worker_ids(reports: &[DispatchReport]) -> Vec<&str> {
        reports.iter().map(|r| r.worker.as_str()).collect()
    }

    #[rstest]
    #[case::round_robin(Algorithm::RoundRobin, vec!["1", "2", "3", "1", "2", "3"], 6)]
    #[case::weighted(Algorithm::Weighted, vec!["1", "1", "1", "2", "2", "3"], 6)]
    #[case::least_connections_sequential(Algorithm::LeastConnections, vec!["1"; 6], 0)]
    #[tokio::test]
    async fn sequential_submissions_follow_algorithm(
        #[case] algorithm: Algorithm,
        #[case] expected: Vec<&str>,
        #[case] expected_index: u64,
    ) {
        let transport = Arc::new(ScriptedTransport::default());
        let (coordinator, _) = coordinator_with(transport, algorithm);

        let mut reports = Vec::new();
        for _ in 0..6 {
            reports.push(coordinator.submit(TaskType::from("ping"), "Ping").await);
        }

        assert_eq!(worker_ids(&reports), expected);
        let state = coordinator.snapshot();
        assert_eq!(state.rr_index, expected_index);
        assert!(state.tasks.iter().all(|t| t.status == TaskStatus::Done));
    }

    #[tokio::test]
    async fn completion_is_logged_after_dispatch() {
        let transport = Arc::new(ScriptedTransport::default());
        let (coordinator, _) = coordinator_with(transport.clone(), Algorithm::RoundRobin);

        let report = coordinator.submit(TaskType::from("ping"), "Ping").await;

        assert_eq!(report.status, TaskStatus::Done);
        assert!(report.status.is_terminal());
        assert_eq!(report.attempts, 1);
        assert!(!report.retried);

        let state = coordinator.snapshot();
        let texts: Vec<&str> = state.log.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "→ Ping → worker-1 → 200 OK in 0.25s",
                "→ Ping dispatched → worker-1 (round robin)",
            ]
        );
        assert!(state.log.iter().all(|e| e.ok));

        let task = state.task(report.task_id).unwrap();
        assert_eq!(task.processing_ms, Some(250));
        assert_eq!(task.completed_at.unwrap().timestamp_millis(), T0_MS + 250);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.task_id, report.task_id.to_string());
        assert_eq!(calls[0].1.task_type, "ping");
    }

    #[tokio::test]
    async fn overload_retries_once_on_another_worker() {
        let transport = Arc::new(ScriptedTransport::overloaded(&["1"]));
        let (coordinator, _) = coordinator_with(transport.clone(), Algorithm::RoundRobin);

        let report = coordinator.submit(TaskType::from("ml_inference"), "ML inference").await;

        assert_eq!(report.status, TaskStatus::Done);
        assert!(report.retried);
        assert_eq!(report.attempts, 2);
        assert_ne!(report.worker, WorkerId::from("1"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, WorkerId::from("1"));
        assert_ne!(calls[0].1.task_id, calls[1].1.task_id);

        // the overloaded task was replaced by the retry
        let state = coordinator.snapshot();
        assert_eq!(state.tasks.len(), 1);
        let task = &state.tasks[0];
        assert_eq!(task.id, report.task_id);
        assert!(task.retried);
        assert_eq!(task.status, TaskStatus::Done);

        let retry_line = format!(
            "→ ML inference → worker-1 → 503 overloaded → retrying on {}",
            report.worker.label()
        );
        let success_line = format!(
            "→ ML inference → {} (retry) → 200 OK in 0.25s",
            report.worker.label()
        );
        assert_eq!(state.log[0].text, success_line);
        assert_eq!(state.log[1].text, retry_line);
        assert!(!state.log[1].ok);
    }

    #[tokio::test]
    async fn second_overload_is_terminal() {
        let transport = Arc::new(ScriptedTransport::overloaded(&["1", "2", "3"]));
        let (coordinator, _) = coordinator_with(transport.clone(), Algorithm::RoundRobin);

        let report = coordinator.submit(TaskType::from("ping"), "Ping").await;

        assert_eq!(report.status, TaskStatus::Error);
        assert!(report.retried);
        assert_eq!(report.attempts, 2);
        assert_eq!(transport.calls().len(), 2);

        let state = coordinator.snapshot();
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].status, TaskStatus::Error);
        assert_eq!(state.tasks[0].error.as_deref(), Some("overloaded"));
        assert_eq!(
            state.log[0].text,
            format!("→ Ping → {} (retry) → 503 overloaded", report.worker.label())
        );
        assert!(!state.log[0].ok);
    }

    #[tokio::test]
    async fn transport_failure_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::unreachable(&["1"]));
        let (coordinator, _) = coordinator_with(transport.clone(), Algorithm::RoundRobin);

        let report = coordinator.submit(TaskType::from("ping"), "Ping").await;

        assert_eq!(report.status, TaskStatus::Error);
        assert!(!report.retried);
        assert_eq!(report.attempts, 1);
        assert_eq!(transport.calls().len(), 1);

        let state = coordinator.snapshot();
        assert_eq!(state.tasks[0].error.as_deref(), Some("network error"));
        assert_eq!(state.log[0].text, "→ worker-1 → network error");
        assert!(!state.log[0].ok);
        assert_eq!(coordinator.local_in_flight()[&WorkerId::from("1")], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn least_connections_sees_outstanding_calls() {
        let transport = Arc::new(ScriptedTransport {
            latency_ms: 1_000,
            ..ScriptedTransport::default()
        });
        let (coordinator, _) = coordinator_with(transport, Algorithm::LeastConnections);
        let coordinator = Arc::new(coordinator);

        let first = coordinator.spawn_submit(TaskType::from("ping"), "Ping");
        while coordinator.local_in_flight()[&WorkerId::from("1")] == 0 {
            tokio::task::yield_now().await;
        }
        let second = coordinator.spawn_submit(TaskType::from("ping"), "Ping");
        while coordinator.local_in_flight()[&WorkerId::from("2")] == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(coordinator.pending_counts()[&WorkerId::from("1")], 1);
        assert_eq!(coordinator.pending_counts()[&WorkerId::from("2")], 1);

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert_eq!(first.worker, WorkerId::from("1"));
        assert_eq!(second.worker, WorkerId::from("2"));
        assert!(coordinator.local_in_flight().values().all(|&n| n == 0));
    }

    #[tokio::test]
    async fn set_algorithm_resets_rotation() {
        let transport = Arc::new(ScriptedTransport::default());
        let (coordinator, _) = coordinator_with(transport, Algorithm::RoundRobin);

        coordinator.submit(TaskType::from("ping"), "Ping").await;
        coordinator.submit(TaskType::from("ping"), "Ping").await;
        coordinator.set_algorithm(Algorithm::Weighted);

        let state = coordinator.snapshot();
        assert_eq!(state.algorithm, Algorithm::Weighted);
        assert_eq!(state.rr_index, 0);

        let report = coordinator.submit(TaskType::from("ping"), "Ping").await;
        assert_eq!(report.worker, WorkerId::from("1"));
    }

    #[tokio::test]
    async fn finished_tasks_leave_the_visible_set() {
        let transport = Arc::new(ScriptedTransport::default());
        let (coordinator, clock) = coordinator_with(transport, Algorithm::RoundRobin);

        coordinator.submit(TaskType::from("ping"), "Ping").await;
        assert_eq!(coordinator.visible_tasks_by_worker()[&WorkerId::from("1")].len(), 1);

        // completed at T0 + 250ms; the window closes 3s later
        clock.advance(Duration::milliseconds(3_250));
        assert!(coordinator.visible_tasks_by_worker()[&WorkerId::from("1")].is_empty());
        assert_eq!(coordinator.snapshot().tasks.len(), 1);
    }

    #[tokio::test]
    async fn clear_log_keeps_tasks() {
        let transport = Arc::new(ScriptedTransport::default());
        let (coordinator, _) = coordinator_with(transport, Algorithm::RoundRobin);

        coordinator.submit(TaskType::from("ping"), "Ping").await;
        coordinator.clear_log();

        let state = coordinator.snapshot();
        assert!(state.log.is_empty());
        assert_eq!(state.tasks.len(), 1);
    }
}
