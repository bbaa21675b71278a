//! # rf-task: Cooperative Task Scheduler
//!
//! Runs long, pausable presentation sequences on one logical thread.
//! Tasks interleave only at suspension points; nothing runs in parallel.
//!
//! ## Suspension points
//!
//! - Timed waits (`TaskContext::delay`)
//! - Waits on another task (`TaskContext::wait`, `TaskContext::join_all`)
//! - Waits on an external completion (`TaskContext::until`)
//!
//! Every suspension point observes cancellation first: the task's own
//! cancel request (propagated top-down from its parent) and the per-spin
//! [`CancellationSignal`] (slam-stop).
//!
//! ## Architecture
//!
//! ```text
//! Scheduler
//!     │
//!     ├── virtual clock (ms) + timer queue
//!     ├── ready queue   ← Waker (one per task)
//!     └── live tasks    → Task { Pending → Running → Completed | Cancelled | Faulted }
//! ```
//!
//! Time is virtual: an outer loop drives it with [`Scheduler::tick`], while
//! [`Scheduler::run_until`] jumps straight to the next timer whenever no task
//! is runnable.

mod context;
mod error;
mod scheduler;
mod signal;
mod task;

pub use context::*;
pub use error::*;
pub use scheduler::*;
pub use signal::*;
pub use task::*;
