//! lbsim-core
//!
//! Load-balancer simulator: a coordinator routes simulated tasks to
//! capacity-limited workers and records every state change.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task_type, task, algorithm, wire, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, LatencyModel, WorkerTransport）
//! - **routing**: WorkerPool と 3 つの選択アルゴリズム
//! - **worker**: WorkerCapacityService と HTTP router
//! - **store**: reducer（LbState + Action）と派生ビュー
//! - **app**: DispatchCoordinator, CoordinatorBuilder, RetryDecider
//! - **impls**: WorkerTransport の実装（Local, Router）
//! - **config**: TOML + 環境変数の設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod routing;
pub mod store;
pub mod worker;
