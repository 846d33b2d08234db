//! LocalTransport - WorkerCapacityService を直接呼ぶ transport
//!
//! HTTP を通らないので、シミュレーションやテストでの既定の経路です。

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{LbError, SubmitOutcome, TaskType, WorkerId, WorkerRequest};
use crate::ports::{TransportError, WorkerTransport};
use crate::worker::WorkerCapacityService;

pub struct LocalTransport {
    service: Arc<WorkerCapacityService>,
}

impl LocalTransport {
    pub fn new(service: Arc<WorkerCapacityService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<WorkerCapacityService> {
        &self.service
    }
}

#[async_trait]
impl WorkerTransport for LocalTransport {
    async fn submit(
        &self,
        worker: &WorkerId,
        request: WorkerRequest,
    ) -> Result<SubmitOutcome, TransportError> {
        let task_type = TaskType::new(request.task_type);
        self.service
            .submit(worker, &request.task_id, &task_type)
            .await
            .map_err(|err| match err {
                // same answer the HTTP surface gives
                LbError::UnknownWorker(_) => TransportError::UnexpectedStatus {
                    worker: worker.clone(),
                    status: 404,
                },
                other => TransportError::Unreachable {
                    worker: worker.clone(),
                    reason: other.to_string(),
                },
            })
    }
}
