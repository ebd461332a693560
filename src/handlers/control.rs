//! Control client handler
//!
//! Serves operator tooling: registering RPis and peripherals, moving
//! peripherals between RPis, recording measurements, managing irrigation
//! schedules, and triggering irrigation on a connected irrigation system.

use async_trait::async_trait;
use log::{error, info, warn};

use crate::client::{ClientKind, SessionRegistry};
use crate::error::{HandlerError, StoreError};
use crate::handlers::{Handler, reply, respond};
use crate::protocol::messages::{
    DailySchedule, IrrigationCommand, RegisterIrrigationSystem, RegisterRpi,
    RegisterSoilMoistureSensor, SendSoilMoistureMeasurement, SetIrrigationSchedule,
    UnscheduledIrrigationRequest, UpdatePeripheralOwnership,
};
use crate::protocol::{ErrorCode, Message, responses};
use crate::storage::DomainStore;
use crate::transport::Handle;

pub struct ControlHandler {
    store: Box<dyn DomainStore>,
}

impl ControlHandler {
    pub fn new(store: Box<dyn DomainStore>) -> Self {
        Self { store }
    }

    fn register_rpi(&mut self, request: &RegisterRpi) -> Result<Message, StoreError> {
        if request.name.trim().is_empty() {
            return Ok(responses::failure(ErrorCode::InvalidParameter, "RPi name must not be empty"));
        }
        if self.store.contains_rpi_named(&request.name)? {
            warn!("RPi already exists with name: {}", request.name);
            return Ok(responses::failure(
                ErrorCode::InvalidParameter,
                "RPi with that name already exists",
            ));
        }

        let id = self.store.insert_rpi(&request.name, &request.location)?;
        info!("Registered RPi {} with id {}", request.name, id);
        Ok(responses::ok_with_id(id))
    }

    /// Shared checks for a new peripheral: non-empty unique name and, when
    /// given, an existing owner.
    fn check_new_peripheral(&mut self, name: &str, rpi_id: Option<u64>) -> Result<Option<Message>, StoreError> {
        if name.trim().is_empty() {
            return Ok(Some(responses::failure(
                ErrorCode::InvalidParameter,
                "peripheral name must not be empty",
            )));
        }
        if let Some(rpi_id) = rpi_id {
            if !self.store.contains_rpi(rpi_id)? {
                return Ok(Some(responses::failure(
                    ErrorCode::NotFound,
                    format!("no RPi with id {}", rpi_id),
                )));
            }
        }
        if self.store.contains_peripheral_named(name)? {
            return Ok(Some(responses::failure(
                ErrorCode::InvalidParameter,
                "peripheral with that name already exists",
            )));
        }
        Ok(None)
    }

    fn register_soil_moisture_sensor(
        &mut self,
        request: &RegisterSoilMoistureSensor,
    ) -> Result<Message, StoreError> {
        if let Some(rejection) = self.check_new_peripheral(&request.meta.name, request.meta.rpi_id)? {
            return Ok(rejection);
        }
        if !(request.floor < request.ceil) {
            return Ok(responses::failure(
                ErrorCode::InvalidParameter,
                "sensor floor must be below its ceiling",
            ));
        }

        let id = self.store.insert_soil_moisture_sensor(
            &request.meta.name,
            request.meta.rpi_id,
            request.floor,
            request.ceil,
        )?;
        info!("Registered soil moisture sensor {} with id {}", request.meta.name, id);
        Ok(responses::ok_with_id(id))
    }

    fn register_irrigation_system(&mut self, request: &RegisterIrrigationSystem) -> Result<Message, StoreError> {
        if let Some(rejection) = self.check_new_peripheral(&request.meta.name, request.meta.rpi_id)? {
            return Ok(rejection);
        }

        let id = self
            .store
            .insert_irrigation_system(&request.meta.name, request.meta.rpi_id)?;
        info!("Registered irrigation system {} with id {}", request.meta.name, id);
        Ok(responses::ok_with_id(id))
    }

    fn update_peripheral_ownership(&mut self, request: &UpdatePeripheralOwnership) -> Result<Message, StoreError> {
        info!(
            "Updating peripheral ownership: rpi_id={}, peripheral_id={}, orphan={}",
            request.rpi_id, request.peripheral_id, request.orphan_peripheral
        );

        if !self.store.contains_rpi(request.rpi_id)? {
            return Ok(responses::failure(
                ErrorCode::NotFound,
                format!("no RPi with id {}", request.rpi_id),
            ));
        }
        if !self.store.contains_peripheral(request.peripheral_id)? {
            return Ok(responses::failure(
                ErrorCode::NotFound,
                format!("no peripheral with id {}", request.peripheral_id),
            ));
        }

        self.store.update_peripheral_ownership(
            request.peripheral_id,
            request.rpi_id,
            request.orphan_peripheral,
        )?;
        Ok(responses::ok())
    }

    fn set_irrigation_schedule(&mut self, request: &SetIrrigationSchedule) -> Result<Message, StoreError> {
        if !self.store.contains_irrigation_system(request.irrigation_system_id)? {
            return Ok(responses::failure(
                ErrorCode::NotFound,
                format!("no irrigation system with id {}", request.irrigation_system_id),
            ));
        }
        if let Err(reason) = request.daily_schedules.iter().try_for_each(validate_daily_schedule) {
            return Ok(responses::failure(ErrorCode::InvalidParameter, reason));
        }

        self.store
            .replace_irrigation_schedule(request.irrigation_system_id, &request.daily_schedules)?;
        info!(
            "Stored {} daily irrigation entries for irrigation system {}",
            request.daily_schedules.len(),
            request.irrigation_system_id
        );
        Ok(responses::ok())
    }

    async fn unscheduled_irrigation(
        &mut self,
        request: UnscheduledIrrigationRequest,
        origin: Handle,
        sessions: &mut SessionRegistry,
    ) -> Result<(), HandlerError> {
        info!(
            "Handling unscheduled irrigation request: irrigation_system_id={}, duration_ms={}",
            request.irrigation_system_id, request.duration_ms
        );

        if request.duration_ms == 0 {
            let response = responses::failure(ErrorCode::InvalidParameter, "duration must be positive");
            return reply(sessions, origin, response).await;
        }
        match self.store.contains_irrigation_system(request.irrigation_system_id) {
            Ok(true) => {}
            Ok(false) => {
                let response = responses::failure(
                    ErrorCode::NotFound,
                    format!("no irrigation system with id {}", request.irrigation_system_id),
                );
                return reply(sessions, origin, response).await;
            }
            Err(e) => return respond(sessions, origin, Err(e)).await,
        }

        let response = forward_irrigation(&request, sessions).await;
        reply(sessions, origin, response).await
    }
}

/// Sends an irrigation command to the live session of the target system and
/// returns the reply for the requester. A target whose connection cannot
/// take the write is evicted.
async fn forward_irrigation(request: &UnscheduledIrrigationRequest, sessions: &mut SessionRegistry) -> Message {
    let not_connected = || responses::failure(ErrorCode::Unavailable, "irrigation system is not connected");
    let Some(handle) = sessions.find_classified(ClientKind::IrrigationSystem, request.irrigation_system_id)
    else {
        return not_connected();
    };
    let Some(session) = sessions.get_mut(handle) else {
        return not_connected();
    };

    let command = Message::IrrigationCommand(IrrigationCommand {
        duration_ms: request.duration_ms,
    });
    match session.send(&command).await {
        Ok(()) => responses::ok(),
        Err(e) => {
            error!("Failed to forward irrigation command to session {}: {}", handle, e);
            if sessions.contains(handle) {
                sessions.remove(handle);
            }
            responses::failure(ErrorCode::Unavailable, "irrigation system connection failed")
        }
    }
}

/// Records a soil moisture reading for an existing sensor.
pub(crate) fn store_measurement(
    store: &mut dyn DomainStore,
    request: &SendSoilMoistureMeasurement,
) -> Result<Message, StoreError> {
    if !store.contains_soil_moisture_sensor(request.sensor_id)? {
        return Ok(responses::failure(
            ErrorCode::NotFound,
            format!("no soil moisture sensor with id {}", request.sensor_id),
        ));
    }
    let id = store.insert_soil_moisture_measurement(request.sensor_id, request.value)?;
    Ok(responses::ok_with_id(id))
}

fn validate_daily_schedule(entry: &DailySchedule) -> Result<(), String> {
    if entry.day_of_week_index > 6 {
        return Err(format!("day_of_week_index {} is not in 0..=6", entry.day_of_week_index));
    }
    if !is_military_time(&entry.water_time_military) {
        return Err(format!("'{}' is not an HH:MM time", entry.water_time_military));
    }
    if entry.water_duration_ms == 0 || i64::try_from(entry.water_duration_ms).is_err() {
        return Err(format!("water_duration_ms {} is out of range", entry.water_duration_ms));
    }
    Ok(())
}

fn is_military_time(value: &str) -> bool {
    let Some((hours, minutes)) = value.split_once(':') else {
        return false;
    };
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return false;
    }
    matches!((hours.parse::<u8>(), minutes.parse::<u8>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
}

#[async_trait]
impl Handler for ControlHandler {
    async fn handle(
        &mut self,
        message: Message,
        origin: Handle,
        sessions: &mut SessionRegistry,
    ) -> Result<(), HandlerError> {
        let outcome = match message {
            Message::RegisterRpi(request) => self.register_rpi(&request),
            Message::RegisterSoilMoistureSensor(request) => self.register_soil_moisture_sensor(&request),
            Message::UpdatePeripheralOwnership(request) => self.update_peripheral_ownership(&request),
            Message::SendSoilMoistureMeasurement(request) => store_measurement(self.store.as_mut(), &request),
            Message::RegisterIrrigationSystem(request) => self.register_irrigation_system(&request),
            Message::SetIrrigationSchedule(request) => self.set_irrigation_schedule(&request),
            Message::UnscheduledIrrigationRequest(request) => {
                return self.unscheduled_irrigation(request, origin, sessions).await;
            }
            other => {
                error!("Received unexpected message from control client: {:?}", other.kind());
                return Err(HandlerError::ProtocolViolation(format!(
                    "{:?} is not a control request",
                    other.kind()
                )));
            }
        };
        respond(sessions, origin, outcome).await
    }
}
