//! Server core
//!
//! The readiness primitive, the single-task event loop built on it, and the
//! TCP-bound server that wires the loop to its handlers and store.

pub mod core;
pub mod event_loop;
pub mod readiness;

pub use core::Server;
pub use event_loop::{EventLoop, LoopOptions};
pub use readiness::{ReadySet, wait_ready};
