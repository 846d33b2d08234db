//! LatencyModel port - 処理時間の抽選
//!
//! ワーカーが「どれだけ働くか」を決める関数を差し替え可能にしておきます。
//! 実際に待つのは `tokio::time::sleep` なので、テストでは
//! `#[tokio::test(start_paused = true)]` と組み合わせると待ち時間ゼロで決定的に動きます。

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::DurationRange;

pub trait LatencyModel: Send + Sync {
    /// Draws a processing time in `range` (inclusive), in milliseconds.
    fn sample(&self, range: DurationRange) -> u64;
}

/// Uniform draw over the inclusive range.
pub struct UniformLatency {
    rng: Mutex<StdRng>,
}

impl UniformLatency {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl LatencyModel for UniformLatency {
    fn sample(&self, range: DurationRange) -> u64 {
        self.rng.lock().gen_range(range.min_ms()..=range.max_ms())
    }
}

/// Always the same duration, whatever the range says.
#[derive(Debug, Clone, Copy)]
pub struct FixedLatency(pub u64);

impl LatencyModel for FixedLatency {
    fn sample(&self, _range: DurationRange) -> u64 {
        self.0
    }
}
