//! Board error types

use thiserror::Error;

use crate::batch::MutationId;
use crate::grid::CellPos;

/// Board and mutation errors
///
/// Every variant except `InvalidGrid`/`ShapeMismatch`/`MalformedBatch` is
/// recoverable at the scope of a single mutation: skip it, report it, go on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoardError {
    #[error("Malformed mutation #{index} (type '{type_name}'): {reason}")]
    MalformedMutation {
        index: usize,
        type_name: String,
        reason: String,
    },

    #[error("Malformed mutation batch: {0}")]
    MalformedBatch(String),

    #[error("No animation target at {cell}: {reason}")]
    MissingAnimationTarget { cell: CellPos, reason: String },

    #[error("Mutation {0} already applied this spin")]
    AlreadyApplied(MutationId),

    #[error("Unknown mutation {0}")]
    UnknownMutation(MutationId),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Stops shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
}

impl BoardError {
    pub(crate) fn missing(cell: CellPos, reason: impl Into<String>) -> Self {
        Self::MissingAnimationTarget {
            cell,
            reason: reason.into(),
        }
    }

    /// Can the pipeline skip this one mutation and continue?
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidGrid(_) | Self::ShapeMismatch { .. } | Self::MalformedBatch(_)
        )
    }
}

/// Result type for board operations
pub type BoardResult<T> = Result<T, BoardError>;
