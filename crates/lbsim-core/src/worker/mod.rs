//! Worker side: capacity-limited task execution and its HTTP router.

pub mod capacity;
pub mod http;

pub use self::capacity::{Admission, DEFAULT_MAX_IN_FLIGHT, InFlightSlot, WorkerCapacityService};
pub use self::http::router;
