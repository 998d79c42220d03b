//! Ordered notifier fallback chain.
//!
//! Notifiers are tried in order until one succeeds. Dispatch is fire and
//! forget: the transition that produced the notification has already been
//! committed and is never affected by delivery.

use gatepass_core::notify::{Notification, Notifier, NotifyError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Notifiers tried in order; the first success wins.
#[derive(Clone, Default)]
pub struct NotifierChain {
    notifiers: Arc<Vec<Arc<dyn Notifier>>>,
}

impl NotifierChain {
    /// Creates a chain trying `notifiers` in order.
    #[must_use]
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            notifiers: Arc::new(notifiers),
        }
    }

    /// Whether the chain has no notifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Try each notifier in order.
    ///
    /// Returns the name of the notifier that delivered.
    ///
    /// # Errors
    ///
    /// Returns the last notifier's error if every notifier failed, or an
    /// error if the chain is empty.
    pub async fn deliver(&self, notification: Notification) -> Result<String, NotifyError> {
        let mut last_error = NotifyError::new("chain", "no notifiers configured");

        for notifier in self.notifiers.iter() {
            match notifier.send(notification.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        pass_id = %notification.pass_id,
                        kind = %notification.kind,
                        channel = notifier.name(),
                        "Notification delivered"
                    );
                    return Ok(notifier.name().to_string());
                }
                Err(error) => {
                    tracing::warn!(
                        pass_id = %notification.pass_id,
                        channel = notifier.name(),
                        error = %error,
                        "Notifier failed, trying next"
                    );
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }

    /// Deliver in the background.
    ///
    /// Outside a Tokio runtime the notification is dropped with a warning.
    pub fn dispatch(&self, notification: Notification) {
        if self.is_empty() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                pass_id = %notification.pass_id,
                "No async runtime, dropping notification"
            );
            return;
        };

        let chain = self.clone();
        handle.spawn(async move {
            let pass_id = notification.pass_id;
            if let Err(error) = chain.deliver(notification).await {
                tracing::error!(%pass_id, error = %error, "All notifiers failed");
            }
        });
    }
}

/// Notifier that writes notifications to the log.
///
/// Used as the last link of a chain so a notification is never silently
/// lost.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                pass_id = %notification.pass_id,
                recipient = %notification.recipient,
                kind = %notification.kind,
                message = %notification.message,
                "Gate pass notification"
            );
            Ok(())
        })
    }
}
