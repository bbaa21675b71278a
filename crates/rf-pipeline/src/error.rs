//! Pipeline error types

use rf_board::BoardError;
use rf_phase::{Phase, PhaseError};
use rf_task::SchedulerError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::module::RegistryError;

/// Errors that stop the pipeline
///
/// Module faults, malformed mutations and missing targets never show up
/// here; they are recovered locally and reported as diagnostics.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A blocking phase could not reach a terminal state; the game loop
    /// would desynchronize, so this is fatal
    #[error("Blocking phase {phase} stalled at {now_ms}ms with {waiting} task(s) waiting")]
    PhaseStalled {
        phase: Phase,
        now_ms: u64,
        waiting: usize,
    },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Board error: {0}")]
    Board(#[from] BoardError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
