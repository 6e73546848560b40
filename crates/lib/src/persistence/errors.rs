//! Errors raised while committing a planned change to the backend.

use thiserror::Error;

use crate::backend::Write;

/// A commit that did not fully reach the backend.
///
/// Both variants are resolved the same way: the optimistic change is rolled
/// back and the affected containers are reconciled. They differ in what the
/// backend may now hold.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CommitError {
    /// The first write failed; the backend is unchanged.
    #[error("Write {write} failed")]
    TransientWrite {
        write: Write,
        #[source]
        source: Box<crate::Error>,
    },

    /// Some writes succeeded before one failed; the backend holds a mix of
    /// old and new ordinals until reconciled.
    #[error("Write {failed} failed after {applied} of {total} writes succeeded")]
    PartialBatchFailure {
        applied: usize,
        total: usize,
        failed: Write,
        #[source]
        source: Box<crate::Error>,
    },
}

impl CommitError {
    /// Check if the backend may hold part of the change.
    pub fn is_partial(&self) -> bool {
        matches!(self, CommitError::PartialBatchFailure { .. })
    }

    /// Number of writes the backend accepted before the failure.
    pub fn applied(&self) -> usize {
        match self {
            CommitError::TransientWrite { .. } => 0,
            CommitError::PartialBatchFailure { applied, .. } => *applied,
        }
    }

    /// The write that failed.
    pub fn failed_write(&self) -> &Write {
        match self {
            CommitError::TransientWrite { write, .. } => write,
            CommitError::PartialBatchFailure { failed, .. } => failed,
        }
    }
}

impl From<CommitError> for crate::Error {
    fn from(err: CommitError) -> Self {
        crate::Error::Commit(err)
    }
}
