use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::types::TableId;

type LockMap = HashMap<TableId, Arc<tokio::sync::Mutex<()>>>;

/// Per-table mutual exclusion shared by everything writing to a staging store.
///
/// Entries only live while a guard is held or awaited, so the map stays as small as the number
/// of tables being written. Cloning shares the lock map.
#[derive(Debug, Clone, Default)]
pub struct TableLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `table_id`, held until the guard is dropped.
    pub async fn acquire(&self, table_id: TableId) -> TableLockGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(table_id).or_default().clone()
        };

        TableLockGuard {
            guard: Some(lock.lock_owned().await),
            table_id,
            locks: self.locks.clone(),
        }
    }

    /// Number of tables with a held or awaited lock.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one table, released on drop.
#[derive(Debug)]
pub struct TableLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    table_id: TableId,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for TableLockGuard {
    fn drop(&mut self) {
        // Release before pruning so the mutex is only referenced by the map and by waiters.
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the entry under the map lock, so a count of one means nobody else uses it.
        if locks
            .get(&self.table_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.table_id);
        }
    }
}
