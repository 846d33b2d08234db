//! WorkerTransport port - コーディネータからワーカーへの呼び出し
//!
//! # 実装
//! - `impls::LocalTransport`: WorkerCapacityService を直接呼ぶ
//! - `impls::RouterTransport`: axum Router をプロセス内で叩く（wire 形式を通る）
//!
//! 503 相当は `Ok(SubmitOutcome::Overloaded)`、それ以外の失敗は `TransportError`。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{SubmitOutcome, WorkerId, WorkerRequest};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unexpected status {status} from worker-{worker}")]
    UnexpectedStatus { worker: WorkerId, status: u16 },

    #[error("could not decode response from worker-{worker}: {reason}")]
    Decode { worker: WorkerId, reason: String },

    #[error("worker-{worker} unreachable: {reason}")]
    Unreachable { worker: WorkerId, reason: String },
}

#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn submit(
        &self,
        worker: &WorkerId,
        request: WorkerRequest,
    ) -> Result<SubmitOutcome, TransportError>;
}
