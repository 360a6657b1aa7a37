//! Batch application against staging stores.

mod guard;
mod locks;
mod upsert;

pub use guard::DescriptorGuard;
pub use locks::{TableLockGuard, TableLocks};
pub use upsert::{BatchOutcome, UpsertEngine};
