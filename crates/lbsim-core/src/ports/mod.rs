//! Ports - 抽象化レイヤー
//!
//! 外部要因（時刻、乱数、ID、ワーカーへの通信）を trait で切り出します。
//! コアのロジックはこれらにだけ依存するので、テストでは差し替えて決定的に動かせます。

pub mod clock;
pub mod id_generator;
pub mod latency;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::latency::{FixedLatency, LatencyModel, UniformLatency};
pub use self::transport::{TransportError, WorkerTransport};
