//! Error types for task scheduling

use thiserror::Error;

/// Returned by a suspension point when the waiting task was cancelled
///
/// Not a failure: a task that propagates it ends in `TaskState::Cancelled`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("task cancelled")]
pub struct Cancelled;

/// How a task body ended, when it did not end normally
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,

    #[error("task faulted: {0}")]
    Fault(String),
}

impl TaskError {
    /// Create a fault from any message
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Result of a task body
pub type TaskResult = Result<(), TaskError>;

/// Scheduler-level failures
///
/// These mean the run loop could not bring the requested tasks to a
/// terminal state; the caller decides whether that is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler stalled at {now_ms}ms: {waiting} task(s) waiting with no runnable task and no timer")]
    Stalled { now_ms: u64, waiting: usize },

    #[error("Poll budget of {budget} exhausted at {now_ms}ms")]
    PollBudgetExhausted { budget: u64, now_ms: u64 },
}

/// Result type for scheduler runs
pub type SchedulerResult<T> = Result<T, SchedulerError>;
