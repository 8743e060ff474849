//! Event loop, listener bootstrap and the cross-thread wake channel.

pub mod event_loop;
pub mod listener;
pub mod notify;

pub use event_loop::Server;
pub use notify::Notifier;
