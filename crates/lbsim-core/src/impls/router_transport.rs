//! RouterTransport - axum Router をプロセス内で叩く transport
//!
//! ソケットは開かず `tower::ServiceExt::oneshot` で 1 リクエストずつ流します。
//! JSON のエンコード / デコードとステータスコードの解釈は本物の HTTP 経路と同じです。

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use crate::domain::{SubmitOutcome, WorkerId, WorkerRequest};
use crate::ports::{TransportError, WorkerTransport};

/// Upper bound on a worker response body.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct RouterTransport {
    router: Router,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl WorkerTransport for RouterTransport {
    async fn submit(
        &self,
        worker: &WorkerId,
        request: WorkerRequest,
    ) -> Result<SubmitOutcome, TransportError> {
        let unreachable_err = |reason: String| TransportError::Unreachable {
            worker: worker.clone(),
            reason,
        };

        let body = serde_json::to_vec(&request).map_err(|e| unreachable_err(e.to_string()))?;
        let http_request = Request::post(format!("/worker/{}", worker.as_str()))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| unreachable_err(e.to_string()))?;

        let response = match self.router.clone().oneshot(http_request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let status = response.status();
        let bytes = to_bytes(response.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| unreachable_err(e.to_string()))?;

        match status {
            StatusCode::OK => decode(worker, &bytes).map(SubmitOutcome::Completed),
            StatusCode::SERVICE_UNAVAILABLE => decode(worker, &bytes).map(SubmitOutcome::Overloaded),
            other => Err(TransportError::UnexpectedStatus {
                worker: worker.clone(),
                status: other.as_u16(),
            }),
        }
    }
}

fn decode<T: DeserializeOwned>(worker: &WorkerId, bytes: &[u8]) -> Result<T, TransportError> {
    serde_json::from_slice(bytes).map_err(|e| TransportError::Decode {
        worker: worker.clone(),
        reason: e.to_string(),
    })
}
