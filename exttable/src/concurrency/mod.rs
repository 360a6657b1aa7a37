//! Coordination primitives shared by the scheduler and the notification worker.

pub mod shutdown;
