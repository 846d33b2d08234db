//! Impls - `WorkerTransport` の実装
//!
//! # 含まれる実装
//! - **LocalTransport**: WorkerCapacityService を直接呼ぶ
//! - **RouterTransport**: axum Router を oneshot で叩く（wire 形式を通る）

pub mod local_transport;
pub mod router_transport;

pub use self::local_transport::LocalTransport;
pub use self::router_transport::RouterTransport;
