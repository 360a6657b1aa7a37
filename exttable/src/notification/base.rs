use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::EtlResult;
use crate::types::{DeltaSet, OperationKind, RowId, TableId};

/// Kind of event published on the object bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationEventType {
    /// Rows of an object were added, updated or deleted.
    ObjectAction,
}

impl fmt::Display for NotificationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationEventType::ObjectAction => f.write_str("ObjectAction"),
        }
    }
}

/// Announcement of the rows touched by one applied batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub event_type: NotificationEventType,
    pub table_id: TableId,
    pub table_name: String,
    pub delta: DeltaSet,
}

impl ChangeNotification {
    pub fn object_action(table_id: TableId, table_name: impl Into<String>, delta: DeltaSet) -> Self {
        Self {
            event_type: NotificationEventType::ObjectAction,
            table_id,
            table_name: table_name.into(),
            delta,
        }
    }

    /// Row ids keyed by the operation that touched them. Every key is present, possibly empty.
    pub fn parameters(&self) -> BTreeMap<OperationKind, Vec<RowId>> {
        BTreeMap::from([
            (OperationKind::Add, self.delta.added.iter().copied().collect()),
            (OperationKind::Update, self.delta.updated.iter().copied().collect()),
            (OperationKind::Delete, self.delta.deleted.iter().copied().collect()),
        ])
    }
}

/// Receiver of change notifications, typically an object or message bus.
///
/// Called from a single worker, one notification at a time, in the order they were enqueued.
pub trait NotificationSink {
    fn send_notification(
        &self,
        notification: ChangeNotification,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
