//! Client session management
//!
//! Handles session classification state, session lifecycle, and the registry
//! of live sessions.

pub mod registry;
pub mod session;
pub mod state;

pub use registry::SessionRegistry;
pub use session::Session;
pub use state::{Classification, ClientKind};
