//! Domain model (IDs, task types, records, algorithms, wire bodies).

pub mod algorithm;
pub mod errors;
pub mod ids;
pub mod task;
pub mod task_type;
pub mod wire;

pub use algorithm::{Algorithm, UnknownAlgorithm};
pub use errors::LbError;
pub use ids::{LogId, TaskId, WorkerId};
pub use task::{LogEntry, Task, TaskStatus};
pub use task_type::{
    Complexity, DurationRange, DurationTable, TASK_CATALOG, TaskDef, TaskType, catalog_entry,
};
pub use wire::{SubmitOutcome, WorkerCompleted, WorkerOverloaded, WorkerRequest};
