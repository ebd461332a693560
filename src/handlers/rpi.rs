//! RPi handler
//!
//! RPi hubs report soil moisture readings for the sensors attached to them.

use async_trait::async_trait;
use log::{debug, error};

use crate::client::SessionRegistry;
use crate::error::HandlerError;
use crate::handlers::control::store_measurement;
use crate::handlers::{Handler, respond};
use crate::protocol::Message;
use crate::storage::DomainStore;
use crate::transport::Handle;

pub struct RpiHandler {
    store: Box<dyn DomainStore>,
}

impl RpiHandler {
    pub fn new(store: Box<dyn DomainStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Handler for RpiHandler {
    async fn handle(
        &mut self,
        message: Message,
        origin: Handle,
        sessions: &mut SessionRegistry,
    ) -> Result<(), HandlerError> {
        match message {
            Message::SendSoilMoistureMeasurement(request) => {
                debug!(
                    "Measurement from session {}: sensor {} = {}",
                    origin, request.sensor_id, request.value
                );
                let outcome = store_measurement(self.store.as_mut(), &request);
                respond(sessions, origin, outcome).await
            }
            other => {
                error!("Received unexpected message from RPi client: {:?}", other.kind());
                Err(HandlerError::ProtocolViolation(format!(
                    "{:?} is not an RPi report",
                    other.kind()
                )))
            }
        }
    }
}
