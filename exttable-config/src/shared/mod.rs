mod base;
mod connection;
mod listener;
mod notification;
mod scheduler;
mod store;
mod updater;
mod upload;

pub use base::*;
pub use connection::*;
pub use listener::*;
pub use notification::*;
pub use scheduler::*;
pub use store::*;
pub use updater::*;
pub use upload::*;
