use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::metrics::{
    ERROR_KIND_LABEL, EXTTABLE_NOTIFICATIONS_FAILED_TOTAL, EXTTABLE_NOTIFICATIONS_SENT_TOTAL,
};
use crate::notification::base::{ChangeNotification, NotificationSink};

#[derive(Debug)]
struct Inner {
    tx: Option<mpsc::Sender<ChangeNotification>>,
    worker: Option<JoinHandle<()>>,
}

/// Bounded queue delivering change notifications through a single worker.
///
/// Notifications are delivered strictly in enqueue order across all tables. A sink failure or
/// panic is logged and the worker moves on to the next notification. Producers only wait when the
/// queue is full.
#[derive(Debug, Clone)]
pub struct ChangeNotificationQueue {
    inner: Arc<Mutex<Inner>>,
}

impl ChangeNotificationQueue {
    /// Starts the worker on the current runtime.
    pub fn start<S>(sink: S, capacity: usize) -> Self
    where
        S: NotificationSink + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(sink, rx));

        Self {
            inner: Arc::new(Mutex::new(Inner {
                tx: Some(tx),
                worker: Some(worker),
            })),
        }
    }

    /// Adds a notification to the back of the queue, waiting only while the queue is full.
    pub async fn enqueue(&self, notification: ChangeNotification) -> EtlResult<()> {
        let tx = self.sender()?;

        if tx.send(notification).await.is_err() {
            bail!(
                ErrorKind::NotificationFailed,
                "Notification worker is not running"
            );
        }

        Ok(())
    }

    /// Stops accepting notifications and waits until every queued one was delivered.
    pub async fn shutdown(&self) -> EtlResult<()> {
        let worker = {
            let mut inner = self.lock()?;
            inner.tx = None;
            inner.worker.take()
        };

        let Some(worker) = worker else {
            return Ok(());
        };

        if let Err(err) = worker.await {
            bail!(
                ErrorKind::NotificationFailed,
                "Notification worker terminated abnormally",
                err
            );
        }

        Ok(())
    }

    fn sender(&self) -> EtlResult<mpsc::Sender<ChangeNotification>> {
        match &self.lock()?.tx {
            Some(tx) => Ok(tx.clone()),
            None => bail!(
                ErrorKind::NotificationFailed,
                "Notification queue is shut down"
            ),
        }
    }

    fn lock(&self) -> EtlResult<std::sync::MutexGuard<'_, Inner>> {
        match self.inner.lock() {
            Ok(inner) => Ok(inner),
            Err(_) => bail!(
                ErrorKind::InvalidState,
                "Notification queue state is poisoned"
            ),
        }
    }
}

async fn run_worker<S>(sink: S, mut rx: mpsc::Receiver<ChangeNotification>)
where
    S: NotificationSink,
{
    debug!("notification worker started");

    while let Some(notification) = rx.recv().await {
        let table_id = notification.table_id;
        let result = AssertUnwindSafe(sink.send_notification(notification))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => {
                counter!(EXTTABLE_NOTIFICATIONS_SENT_TOTAL).increment(1);
            }
            Ok(Err(err)) => {
                error!(%table_id, error = %err, "failed to deliver change notification");
                counter!(
                    EXTTABLE_NOTIFICATIONS_FAILED_TOTAL,
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);
            }
            Err(_) => {
                error!(%table_id, "notification sink panicked");
                counter!(
                    EXTTABLE_NOTIFICATIONS_FAILED_TOTAL,
                    ERROR_KIND_LABEL => "panic"
                )
                .increment(1);
            }
        }
    }

    info!("notification worker stopped");
}
