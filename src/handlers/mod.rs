//! Message handlers
//!
//! A handler consumes one message on behalf of one session. It may write to
//! that session, look up and write to other sessions through the registry,
//! and call into the domain store. Returning an error evicts the calling
//! session; a handler that wants to keep the session open after a rejected
//! request writes a failure response and returns `Ok`.

pub mod classification;
pub mod control;
pub mod irrigation;
pub mod rpi;

use std::collections::HashMap;

use async_trait::async_trait;
use log::error;

use crate::client::{ClientKind, Session, SessionRegistry};
use crate::error::{HandlerError, ServerError, StoreError};
use crate::protocol::{ErrorCode, Message, responses};
use crate::transport::Handle;

pub use classification::ClassificationHandler;
pub use control::ControlHandler;
pub use irrigation::IrrigationSystemHandler;
pub use rpi::RpiHandler;

#[async_trait]
pub trait Handler: Send {
    /// Handles `message` read from the session at `origin`.
    ///
    /// `sessions` is the live registry and always contains `origin` when the
    /// call starts.
    async fn handle(
        &mut self,
        message: Message,
        origin: Handle,
        sessions: &mut SessionRegistry,
    ) -> Result<(), HandlerError>;
}

/// Fixed mapping from client kind to its handler, built once at startup.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<ClientKind, Box<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `kind`. Each kind can be bound once.
    pub fn bind(mut self, kind: ClientKind, handler: Box<dyn Handler>) -> Result<Self, ServerError> {
        if self.handlers.contains_key(&kind) {
            return Err(ServerError::DuplicateHandler(kind));
        }
        self.handlers.insert(kind, handler);
        Ok(self)
    }

    pub fn get_mut(&mut self, kind: ClientKind) -> Option<&mut (dyn Handler + 'static)> {
        self.handlers.get_mut(&kind).map(|handler| handler.as_mut())
    }
}

/// Looks up the calling session, which the event loop guarantees is live.
pub(crate) fn origin_session(
    sessions: &mut SessionRegistry,
    origin: Handle,
) -> Result<&mut Session, HandlerError> {
    sessions
        .get_mut(origin)
        .ok_or_else(|| HandlerError::ProtocolViolation(format!("session {} is not registered", origin)))
}

/// Writes `message` back to the calling session.
pub(crate) async fn reply(
    sessions: &mut SessionRegistry,
    origin: Handle,
    message: Message,
) -> Result<(), HandlerError> {
    origin_session(sessions, origin)?.send(&message).await?;
    Ok(())
}

/// Sends the outcome of a store-backed request.
///
/// A store failure gets a best-effort `internal_server_error` reply and then
/// fails the handler.
pub(crate) async fn respond(
    sessions: &mut SessionRegistry,
    origin: Handle,
    outcome: Result<Message, StoreError>,
) -> Result<(), HandlerError> {
    match outcome {
        Ok(response) => reply(sessions, origin, response).await,
        Err(e) => {
            error!("Store operation for session {} failed: {}", origin, e);
            let _ = reply(
                sessions,
                origin,
                responses::failure(ErrorCode::InternalServerError, "internal store failure"),
            )
            .await;
            Err(e.into())
        }
    }
}
