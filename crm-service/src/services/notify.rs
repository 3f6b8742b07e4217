//! Fire-and-forget notification dispatch.
//!
//! Claim events produce notification records for the people involved.
//! Dispatch happens off the request path; a failed insert is logged and
//! dropped, never surfaced to the caller.

use crate::models::Notification;
use crate::services::store::CrmStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn CrmStore>,
}

impl Notifier {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    /// Record a notification for `recipient` without blocking the caller.
    pub fn dispatch(&self, recipient: &str, message: String) {
        let store = self.store.clone();
        let notification = Notification::new(recipient.to_string(), message);
        tokio::spawn(async move {
            if let Err(e) = store.insert_notification(notification).await {
                tracing::warn!(error = %e, "failed to record notification");
            }
        });
    }
}
