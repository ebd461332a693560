//! organicdump control-plane server
//!
//! Multiplexes many long-lived client connections on one task, classifies
//! each connection with a handshake, and routes every later message to the
//! handler bound to the connection's client kind.

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transport;
pub mod utils;

pub use config::ServerConfig;
pub use server::Server;
