//! Handshake handler
//!
//! Serves every session that has not yet classified itself. The only message
//! accepted here is `Hello`, which moves the session to its declared kind.

use async_trait::async_trait;
use log::{error, info};

use crate::client::{ClientKind, SessionRegistry};
use crate::error::HandlerError;
use crate::handlers::{Handler, origin_session};
use crate::protocol::{Message, responses};
use crate::transport::Handle;

#[derive(Debug, Default)]
pub struct ClassificationHandler {
    acknowledge: bool,
}

impl ClassificationHandler {
    /// With `acknowledge` set, a successful handshake is answered with an
    /// `ok` response carrying the client id.
    pub fn new(acknowledge: bool) -> Self {
        Self { acknowledge }
    }
}

#[async_trait]
impl Handler for ClassificationHandler {
    async fn handle(
        &mut self,
        message: Message,
        origin: Handle,
        sessions: &mut SessionRegistry,
    ) -> Result<(), HandlerError> {
        let hello = match message {
            Message::Hello(hello) => hello,
            other => {
                error!(
                    "Expected Hello from unclassified session {}, received {:?}",
                    origin,
                    other.kind()
                );
                return Err(HandlerError::ProtocolViolation(format!(
                    "{:?} sent before handshake",
                    other.kind()
                )));
            }
        };

        let kind = ClientKind::from_wire(hello.client_type).ok_or(HandlerError::InvalidHandshakeTarget)?;
        let session = origin_session(sessions, origin)?;
        session.classify(kind, hello.client_id)?;

        info!(
            "Session {} ({}) classified as {} with id {}",
            origin,
            session.peer(),
            kind,
            hello.client_id
        );

        if self.acknowledge {
            session.send(&responses::ok_with_id(hello.client_id)).await?;
        }
        Ok(())
    }
}
