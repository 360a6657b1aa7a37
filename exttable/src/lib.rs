//! Ingestion of external data into per-table staging stores.
//!
//! Raw JSON records, pushed by callers or pulled from remote listeners, are mapped onto a table's
//! field mappings, staged with durable row ids and announced through change notifications. Tables
//! fed by a listener are polled by the auto-update scheduler, and analysis tables are copied into
//! an analytic destination after each successful fetch.

pub mod concurrency;
pub mod engine;
pub mod error;
pub mod listener;
mod macros;
pub mod metrics;
pub mod migrations;
pub mod notification;
pub mod scheduler;
pub mod schema;
pub mod store;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod transform;
pub mod types;
pub mod upload;
