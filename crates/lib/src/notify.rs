//! Fire-and-forget notifications about commit outcomes.
//!
//! The editor reports every commit failure (and the reconciliation that
//! follows) to a [`NotificationSink`]. Sinks must never block or fail; a
//! closed channel simply drops the message.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::id::ID;

/// Something a user of the editor may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Committed {
        containers: Vec<ID>,
        writes: usize,
    },
    /// A write failed; the change was rolled back locally.
    CommitFailed {
        containers: Vec<ID>,
        message: String,
        /// Some writes reached the backend before the failure.
        partial: bool,
    },
    Reconciled {
        containers: Vec<ID>,
    },
    /// The refetch after a failure also failed; the containers stay flagged.
    ReconcileFailed {
        containers: Vec<ID>,
        message: String,
    },
}

impl Notification {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Notification::CommitFailed { .. } | Notification::ReconcileFailed { .. }
        )
    }
}

/// Receives notifications. Implementations must return promptly.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs notifications through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::Committed { containers, writes } => {
                info!(?containers, writes, "Commit confirmed")
            }
            Notification::Reconciled { containers } => info!(?containers, "Reconciled"),
            Notification::CommitFailed {
                containers,
                message,
                partial,
            } => warn!(?containers, partial, %message, "Commit failed"),
            Notification::ReconcileFailed {
                containers,
                message,
            } => warn!(?containers, %message, "Reconciliation failed"),
        }
    }
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // Nobody listening is fine
        let _ = self.sender.send(notification);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}
