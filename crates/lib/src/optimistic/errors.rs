//! Error types for optimistic state tracking.

use thiserror::Error;

use super::ContainerState;
use crate::id::ID;

/// Errors raised by the [`OptimisticStateManager`](super::OptimisticStateManager).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimisticError {
    /// A commit or reconciliation for this container has not resolved yet.
    #[error("Container {container} is busy ({state:?}); wait for the pending commit to resolve")]
    ContainerBusy {
        container: ID,
        state: ContainerState,
    },

    /// The ticket was already resolved or never issued.
    #[error("Unknown commit ticket: {ticket}")]
    UnknownTicket { ticket: u64 },

    /// The whole tree cannot be replaced while commits are in flight.
    #[error("{count} commits are still pending")]
    CommitsPending { count: usize },
}

impl OptimisticError {
    /// Check if this error means the caller should retry once a commit resolves.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            OptimisticError::ContainerBusy { .. } | OptimisticError::CommitsPending { .. }
        )
    }

    /// Get the busy container, if this error names one.
    pub fn container(&self) -> Option<&ID> {
        match self {
            OptimisticError::ContainerBusy { container, .. } => Some(container),
            _ => None,
        }
    }
}

impl From<OptimisticError> for crate::Error {
    fn from(err: OptimisticError) -> Self {
        crate::Error::Optimistic(err)
    }
}
