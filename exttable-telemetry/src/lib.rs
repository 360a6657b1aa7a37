//! Tracing setup shared by the external-table services and their tests.

pub mod tracing;
