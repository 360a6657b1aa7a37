//! Incremental fetches from remote listener endpoints.

mod client;

pub use client::{API_SEPARATOR, ListenerClient, build_listener_url};
