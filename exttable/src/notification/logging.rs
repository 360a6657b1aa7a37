use tracing::info;

use crate::error::EtlResult;
use crate::notification::base::{ChangeNotification, NotificationSink};

/// Sink that publishes notifications as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    async fn send_notification(&self, notification: ChangeNotification) -> EtlResult<()> {
        info!(
            event_type = %notification.event_type,
            table_id = %notification.table_id,
            table_name = %notification.table_name,
            added = notification.delta.added.len(),
            updated = notification.delta.updated.len(),
            deleted = notification.delta.deleted.len(),
            "table rows changed"
        );

        Ok(())
    }
}
