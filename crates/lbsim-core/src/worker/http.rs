//! HTTP surface of the worker endpoints.
//!
//! - `POST /worker/{worker_id}` → 200 completion / 503 overloaded / 404 unknown worker
//! - `GET /workers` → authoritative in-flight counters

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;

use super::WorkerCapacityService;
use crate::domain::{LbError, SubmitOutcome, TaskType, WorkerId, WorkerRequest};

pub fn router(service: Arc<WorkerCapacityService>) -> Router {
    Router::new()
        .route("/worker/{worker_id}", post(submit_task))
        .route("/workers", get(list_workers))
        .with_state(service)
}

async fn submit_task(
    State(service): State<Arc<WorkerCapacityService>>,
    Path(worker_id): Path<String>,
    Json(request): Json<WorkerRequest>,
) -> Result<Response, LbError> {
    let worker = WorkerId::new(worker_id);
    let task_type = TaskType::new(request.task_type);

    let response = match service.submit(&worker, &request.task_id, &task_type).await? {
        SubmitOutcome::Completed(body) => (StatusCode::OK, Json(body)).into_response(),
        SubmitOutcome::Overloaded(body) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    };
    Ok(response)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkersView {
    max_in_flight: usize,
    in_flight: BTreeMap<String, usize>,
}

async fn list_workers(State(service): State<Arc<WorkerCapacityService>>) -> Json<WorkersView> {
    let in_flight = service
        .in_flight_snapshot()
        .into_iter()
        .map(|(id, count)| (id.to_string(), count))
        .collect();
    Json(WorkersView {
        max_in_flight: service.max_in_flight(),
        in_flight,
    })
}

impl IntoResponse for LbError {
    fn into_response(self) -> Response {
        match self {
            LbError::UnknownWorker(worker) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "unknown worker", "worker": worker })),
            )
                .into_response(),
            other => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": other.to_string() })),
            )
                .into_response(),
        }
    }
}
