//! App - アプリケーション層
//!
//! ports と routing / store を組み合わせて、振り分けとリトライを実装します。
//!
//! # 主要コンポーネント
//! - **DispatchCoordinator**: worker 選択 → 送信 → 結果を Action に変換
//! - **CoordinatorBuilder**: 構築とワイヤリング（Fail-fast 検証）
//! - **RetryDecider**: overload 後の行動を決める純粋ロジック

pub mod builder;
pub mod coordinator;
pub mod retry;

pub use self::builder::{BuildError, CoordinatorBuilder};
pub use self::coordinator::{DispatchCoordinator, DispatchReport};
pub use self::retry::{Decision, RetryDecider};
