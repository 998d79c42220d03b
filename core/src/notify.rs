//! Outbound notifications.
//!
//! The engine notifies the requester when a pass is approved, completed or
//! expired. Delivery is best effort: a failed notification never fails or
//! rolls back the transition that triggered it.

use crate::types::{ActorId, GatePassId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// The pass was approved
    Approved,
    /// The full approved quantity was picked up
    Completed,
    /// The approval window lapsed
    Expired,
}

impl NotificationKind {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message for the requester of a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// The pass
    pub pass_id: GatePassId,
    /// Who to notify
    pub recipient: ActorId,
    /// What happened
    pub kind: NotificationKind,
    /// Human readable text
    pub message: String,
}

/// Notification delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notifier {channel} failed: {reason}")]
pub struct NotifyError {
    /// Channel that failed
    pub channel: String,
    /// Why
    pub reason: String,
}

impl NotifyError {
    /// Creates a new `NotifyError`
    #[must_use]
    pub fn new(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

/// A delivery channel (SMS, email, chat, log).
pub trait Notifier: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the channel could not deliver it.
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
