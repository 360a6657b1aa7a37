//! Ordered, decoupled delivery of change notifications.

mod base;
mod logging;
mod memory;
mod queue;

pub use base::{ChangeNotification, NotificationEventType, NotificationSink};
pub use logging::TracingNotificationSink;
pub use memory::MemoryNotificationSink;
pub use queue::ChangeNotificationQueue;
