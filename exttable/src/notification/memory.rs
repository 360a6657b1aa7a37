use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::error::EtlResult;
use crate::notification::base::{ChangeNotification, NotificationSink};

#[derive(Debug, Default)]
struct Inner {
    notifications: Vec<ChangeNotification>,
}

/// Sink recording every notification it receives, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotificationSink {
    inner: Arc<Mutex<Inner>>,
    delivered: Arc<Notify>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<ChangeNotification> {
        self.inner.lock().await.notifications.clone()
    }

    /// Waits until at least `count` notifications were delivered.
    pub async fn wait_for(&self, count: usize) -> Vec<ChangeNotification> {
        loop {
            let delivered = self.delivered.notified();
            {
                let inner = self.inner.lock().await;
                if inner.notifications.len() >= count {
                    return inner.notifications.clone();
                }
            }
            delivered.await;
        }
    }
}

impl NotificationSink for MemoryNotificationSink {
    async fn send_notification(&self, notification: ChangeNotification) -> EtlResult<()> {
        self.inner.lock().await.notifications.push(notification);
        self.delivered.notify_waiters();

        Ok(())
    }
}
