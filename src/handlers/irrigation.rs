//! Irrigation system handler
//!
//! Irrigation controllers only answer the commands forwarded to them.

use async_trait::async_trait;
use log::{error, info, warn};

use crate::client::SessionRegistry;
use crate::error::HandlerError;
use crate::handlers::Handler;
use crate::protocol::{ErrorCode, Message};
use crate::transport::Handle;

#[derive(Debug, Default)]
pub struct IrrigationSystemHandler;

impl IrrigationSystemHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for IrrigationSystemHandler {
    async fn handle(
        &mut self,
        message: Message,
        origin: Handle,
        _sessions: &mut SessionRegistry,
    ) -> Result<(), HandlerError> {
        match message {
            Message::BasicResponse(ack) if ack.code == ErrorCode::Ok => {
                info!("Irrigation system session {} acknowledged command", origin);
                Ok(())
            }
            Message::BasicResponse(ack) => {
                warn!(
                    "Irrigation system session {} rejected command: {:?} {}",
                    origin,
                    ack.code,
                    ack.message.unwrap_or_default()
                );
                Ok(())
            }
            other => {
                error!(
                    "Received unexpected message from irrigation system: {:?}",
                    other.kind()
                );
                Err(HandlerError::ProtocolViolation(format!(
                    "{:?} is not an irrigation acknowledgement",
                    other.kind()
                )))
            }
        }
    }
}
