//! Error handling
//!
//! Defines error types for the transport, protocol, handler, store and server layers.

pub mod types;

pub use types::*;
