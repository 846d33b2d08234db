//! WorkerCapacityService - ワーカーごとの同時実行数を管理
//!
//! # 設計原則
//! - カウンタはこのサービスが所有する唯一の共有可変状態
//! - 「読んで・判定して・増やす」は 1 回のロックの中で完結（await を跨がない）
//! - 減算も 1 回のロックで完結し、0 未満にはならない
//! - 満杯なら即座に Overloaded を返す（キューイングもリトライもしない）
//!
//! # フロー
//! 1. `admit()` で枠を確保（InFlightSlot を返す）
//! 2. `InFlightSlot::run()` で処理時間を抽選して sleep
//! 3. 枠を解放し、解放後の値を queueDepth として返す

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    DurationTable, LbError, SubmitOutcome, TaskType, WorkerCompleted, WorkerId, WorkerOverloaded,
};
use crate::ports::{Clock, LatencyModel, SystemClock, UniformLatency};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

pub struct WorkerCapacityService {
    max_in_flight: usize,
    durations: DurationTable,
    latency: Arc<dyn LatencyModel>,
    clock: Arc<dyn Clock>,
    counters: Mutex<HashMap<WorkerId, usize>>,
}

/// Result of the atomic check-and-increment step.
#[must_use]
pub enum Admission<'a> {
    Admitted(InFlightSlot<'a>),
    Overloaded(WorkerOverloaded),
}

impl WorkerCapacityService {
    pub fn new<'a>(workers: impl IntoIterator<Item = &'a WorkerId>, max_in_flight: usize) -> Self {
        let counters = workers.into_iter().map(|id| (id.clone(), 0)).collect();
        Self {
            max_in_flight,
            durations: DurationTable::default(),
            latency: Arc::new(UniformLatency::from_entropy()),
            clock: Arc::new(SystemClock),
            counters: Mutex::new(counters),
        }
    }

    pub fn with_durations(mut self, durations: DurationTable) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_latency(mut self, latency: Arc<dyn LatencyModel>) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn in_flight(&self, worker: &WorkerId) -> Option<usize> {
        self.counters.lock().get(worker).copied()
    }

    pub fn in_flight_snapshot(&self) -> HashMap<WorkerId, usize> {
        self.counters.lock().clone()
    }

    /// Check capacity and take a slot, in one critical section.
    ///
    /// Never suspends. A full worker yields `Admission::Overloaded` and the
    /// counter is left untouched.
    pub fn admit(&self, worker: &WorkerId, task_id: &str) -> Result<Admission<'_>, LbError> {
        let in_flight = {
            let mut counters = self.counters.lock();
            let count = counters
                .get_mut(worker)
                .ok_or_else(|| LbError::UnknownWorker(worker.to_string()))?;
            if *count >= self.max_in_flight {
                None
            } else {
                *count += 1;
                Some(*count)
            }
        };

        match in_flight {
            Some(in_flight) => {
                debug!(worker = %worker, task_id, in_flight, "slot admitted");
                Ok(Admission::Admitted(InFlightSlot {
                    service: self,
                    worker: worker.clone(),
                    task_id: task_id.to_string(),
                    released: false,
                }))
            }
            None => {
                warn!(worker = %worker, task_id, max_in_flight = self.max_in_flight, "worker overloaded");
                Ok(Admission::Overloaded(WorkerOverloaded::new(worker.label(), task_id)))
            }
        }
    }

    /// Admit, simulate the work, release.
    pub async fn submit(
        &self,
        worker: &WorkerId,
        task_id: &str,
        task_type: &TaskType,
    ) -> Result<SubmitOutcome, LbError> {
        match self.admit(worker, task_id)? {
            Admission::Overloaded(body) => Ok(SubmitOutcome::Overloaded(body)),
            Admission::Admitted(slot) => Ok(SubmitOutcome::Completed(slot.run(task_type).await)),
        }
    }

    fn release(&self, worker: &WorkerId) -> usize {
        let mut counters = self.counters.lock();
        match counters.get_mut(worker) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        }
    }
}

/// One occupied unit of a worker's capacity.
///
/// Dropping the slot without `run` finishing (e.g. the request future was
/// cancelled) still gives the capacity back.
pub struct InFlightSlot<'a> {
    service: &'a WorkerCapacityService,
    worker: WorkerId,
    task_id: String,
    released: bool,
}

impl InFlightSlot<'_> {
    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    /// Simulate the task and return the 200 body.
    pub async fn run(mut self, task_type: &TaskType) -> WorkerCompleted {
        let range = self.service.durations.range_for(task_type);
        let processing_ms = self.service.latency.sample(range);

        tokio::time::sleep(Duration::from_millis(processing_ms)).await;

        let queue_depth = self.release();
        let completed_at = self.service.clock.now().timestamp_millis();
        info!(
            worker = %self.worker,
            task_id = %self.task_id,
            task_type = %task_type,
            processing_ms,
            queue_depth,
            "task completed"
        );

        WorkerCompleted {
            task_id: std::mem::take(&mut self.task_id),
            worker: self.worker.label(),
            processing_ms,
            completed_at,
            queue_depth,
        }
    }

    /// Give the slot back; returns the worker's in-flight count afterwards.
    pub fn release(&mut self) -> usize {
        if self.released {
            return self.service.in_flight(&self.worker).unwrap_or(0);
        }
        self.released = true;
        self.service.release(&self.worker)
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        if !self.released {
            debug!(worker = %self.worker, task_id = %self.task_id, "slot dropped before completion");
            self.release();
        }
    }
}
