//! Retry decision for overloaded attempts.
//!
//! Decider は純粋関数（overload された worker + これまでの retry 回数 → 次の行動）。
//! 実行（新しい Task の作成、Action の発行）はコーディネータに任せます。

use rand::Rng;

use crate::domain::WorkerId;
use crate::routing::WorkerPool;

/// What to do after a worker answered "overloaded".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Re-submit as a fresh task on this worker.
    RetryOn(WorkerId),

    /// Leave the task failed.
    GiveUp { reason: &'static str },
}

/// Retry-once policy: the first overload moves the task to a random other
/// worker, any later overload is terminal.
#[derive(Debug, Clone)]
pub struct RetryDecider {
    max_retries: u32,
}

impl RetryDecider {
    pub fn retry_once() -> Self {
        Self { max_retries: 1 }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// # Arguments
    /// * `retries_used` - retries already spent on this submission (0 for the first attempt)
    pub fn decide<R: Rng + ?Sized>(
        &self,
        pool: &WorkerPool,
        overloaded: &WorkerId,
        retries_used: u32,
        rng: &mut R,
    ) -> Decision {
        if retries_used >= self.max_retries {
            return Decision::GiveUp {
                reason: "retry already used",
            };
        }
        match pool.pick_fallback(overloaded, rng) {
            Some(fallback) => Decision::RetryOn(fallback.clone()),
            None => Decision::GiveUp {
                reason: "no other worker",
            },
        }
    }
}

impl Default for RetryDecider {
    fn default() -> Self {
        Self::retry_once()
    }
}
