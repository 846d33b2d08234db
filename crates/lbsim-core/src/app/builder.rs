//! CoordinatorBuilder - コーディネータの構築とワイヤリング
//!
//! # 設計原則
//! - 起動時検証（Fail-fast 設計）: pool と可視ウィンドウは build() で検証
//! - 未指定の port はプロダクション用の実装で埋める（SystemClock, UlidGenerator）

use std::sync::Arc;

use chrono::Duration;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::coordinator::DispatchCoordinator;
use super::retry::RetryDecider;
use crate::domain::{Algorithm, LbError, WorkerId};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator, WorkerTransport};
use crate::routing::WorkerPool;
use crate::store::DEFAULT_VISIBLE_WINDOW_MS;

/// # 使用例
/// ```ignore
/// let coordinator = DispatchCoordinator::builder(transport)
///     .algorithm(Algorithm::Weighted)
///     .seed(7)
///     .build()?;
/// ```
pub struct CoordinatorBuilder {
    transport: Arc<dyn WorkerTransport>,
    workers: Vec<WorkerId>,
    weights: Vec<u32>,
    algorithm: Algorithm,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    seed: Option<u64>,
    visible_window_ms: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid worker pool: {0}")]
    Pool(#[from] LbError),

    #[error("visible window must be positive, got {0}ms")]
    InvalidWindow(i64),
}

impl CoordinatorBuilder {
    pub fn new(transport: Arc<dyn WorkerTransport>) -> Self {
        let pool = WorkerPool::standard();
        Self {
            transport,
            workers: pool.ids().to_vec(),
            weights: pool.weights().to_vec(),
            algorithm: Algorithm::default(),
            clock: None,
            ids: None,
            seed: None,
            visible_window_ms: DEFAULT_VISIBLE_WINDOW_MS,
        }
    }

    /// Worker ids and their weights, validated in `build()`.
    pub fn workers(mut self, workers: Vec<WorkerId>, weights: Vec<u32>) -> Self {
        self.workers = workers;
        self.weights = weights;
        self
    }

    pub fn pool(self, pool: &WorkerPool) -> Self {
        self.workers(pool.ids().to_vec(), pool.weights().to_vec())
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Seed for fallback-worker selection. Entropy when unset.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn visible_window_ms(mut self, window_ms: i64) -> Self {
        self.visible_window_ms = window_ms;
        self
    }

    pub fn build(self) -> Result<DispatchCoordinator, BuildError> {
        let pool = WorkerPool::new(self.workers, self.weights)?;
        if self.visible_window_ms <= 0 {
            return Err(BuildError::InvalidWindow(self.visible_window_ms));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(DispatchCoordinator::from_parts(
            self.transport,
            pool,
            self.algorithm,
            clock,
            ids,
            RetryDecider::retry_once(),
            rng,
            Duration::milliseconds(self.visible_window_ms),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SubmitOutcome, WorkerRequest};
    use crate::ports::TransportError;
    use async_trait::async_trait;

    struct NeverCalled;

    #[async_trait]
    impl WorkerTransport for NeverCalled {
        async fn submit(
            &self,
            worker: &WorkerId,
            _request: WorkerRequest,
        ) -> Result<SubmitOutcome, TransportError> {
            Err(TransportError::Unreachable {
                worker: worker.clone(),
                reason: "not wired".into(),
            })
        }
    }

    fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new(Arc::new(NeverCalled))
    }

    #[test]
    fn test_build_with_defaults() {
        let coordinator = builder().build().unwrap();

        assert_eq!(coordinator.pool(), &WorkerPool::standard());
        assert_eq!(coordinator.snapshot().algorithm, Algorithm::RoundRobin);
    }

    #[test]
    fn test_build_keeps_algorithm() {
        let coordinator = builder().algorithm(Algorithm::Weighted).build().unwrap();
        assert_eq!(coordinator.snapshot().algorithm, Algorithm::Weighted);
    }

    #[test]
    fn test_build_rejects_empty_pool() {
        let result = builder().workers(vec![], vec![]).build();
        assert!(matches!(result, Err(BuildError::Pool(LbError::InvalidPool(_)))));
    }

    #[test]
    fn test_build_rejects_misaligned_weights() {
        let result = builder()
            .workers(vec![WorkerId::from("1"), WorkerId::from("2")], vec![1])
            .build();
        assert!(matches!(result, Err(BuildError::Pool(_))));
    }

    #[test]
    fn test_build_rejects_non_positive_window() {
        let result = builder().visible_window_ms(0).build();
        assert!(matches!(result, Err(BuildError::InvalidWindow(0))));
    }
}
