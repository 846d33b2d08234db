//! Errors - ドメインエラー
//!
//! Overload はエラーではありません（`SubmitOutcome::Overloaded` として返す）。
//! ここに入るのは呼び出し側のミスや設定の不整合だけです。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LbError {
    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("invalid duration range: min {min_ms}ms > max {max_ms}ms")]
    InvalidDurationRange { min_ms: u64, max_ms: u64 },

    #[error("invalid worker pool: {0}")]
    InvalidPool(String),
}
