//! Broadcast shutdown signal.
//!
//! One [`ShutdownTx`] is owned by the host. Every long-lived task holds a [`ShutdownRx`] and stops
//! waiting as soon as the value changes.

use tokio::sync::watch;

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Error returned when no task is listening anymore.
pub type ShutdownError = watch::error::SendError<()>;

/// Sender side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Signals every subscriber to stop.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a shutdown channel whose receivers observe no change until [`ShutdownTx::shutdown`].
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
