//! Task/log state machine and the views derived from it.

pub mod reducer;
pub mod view;

pub use self::reducer::{Action, LOG_CAPACITY, LbState};
pub use self::view::{DEFAULT_VISIBLE_WINDOW_MS, is_visible, pending_counts, visible_by_worker};
