//! Module `messages`
//!
//! Defines the structured messages exchanged between clients and the server,
//! along with the numeric kind codes that identify them on the wire.

use serde::{Deserialize, Serialize};

/// Numeric discriminator carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    BasicResponse,
    RegisterRpi,
    RegisterSoilMoistureSensor,
    UpdatePeripheralOwnership,
    SendSoilMoistureMeasurement,
    RegisterIrrigationSystem,
    SetIrrigationSchedule,
    UnscheduledIrrigationRequest,
    IrrigationCommand,
}

impl MessageKind {
    /// Wire code for this kind. Code 0 is reserved and never assigned.
    pub fn code(self) -> u32 {
        match self {
            MessageKind::Hello => 1,
            MessageKind::BasicResponse => 2,
            MessageKind::RegisterRpi => 3,
            MessageKind::RegisterSoilMoistureSensor => 4,
            MessageKind::UpdatePeripheralOwnership => 5,
            MessageKind::SendSoilMoistureMeasurement => 6,
            MessageKind::RegisterIrrigationSystem => 7,
            MessageKind::SetIrrigationSchedule => 8,
            MessageKind::UnscheduledIrrigationRequest => 9,
            MessageKind::IrrigationCommand => 10,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let kind = match code {
            1 => MessageKind::Hello,
            2 => MessageKind::BasicResponse,
            3 => MessageKind::RegisterRpi,
            4 => MessageKind::RegisterSoilMoistureSensor,
            5 => MessageKind::UpdatePeripheralOwnership,
            6 => MessageKind::SendSoilMoistureMeasurement,
            7 => MessageKind::RegisterIrrigationSystem,
            8 => MessageKind::SetIrrigationSchedule,
            9 => MessageKind::UnscheduledIrrigationRequest,
            10 => MessageKind::IrrigationCommand,
            _ => return None,
        };
        Some(kind)
    }
}

/// Client role as declared on the wire. `Unknown` is what an anonymous
/// connection is; it is never a valid handshake target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Unknown,
    Control,
    Rpi,
    IrrigationSystem,
}

/// Status carried by a [`BasicResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Ok,
    InvalidParameter,
    NotFound,
    Unavailable,
    InternalServerError,
}

/// Handshake: the first message every connection must send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub client_type: ClientType,
    pub client_id: u64,
}

/// Generic reply used for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicResponse {
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRpi {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

/// Fields shared by every peripheral registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeripheralMeta {
    pub name: String,
    /// Owning RPi, if the peripheral is attached to one at registration time.
    #[serde(default)]
    pub rpi_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSoilMoistureSensor {
    pub meta: PeripheralMeta,
    pub floor: f64,
    pub ceil: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePeripheralOwnership {
    pub rpi_id: u64,
    pub peripheral_id: u64,
    /// Drop the current owner without assigning a new one.
    #[serde(default)]
    pub orphan_peripheral: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSoilMoistureMeasurement {
    pub sensor_id: u64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterIrrigationSystem {
    pub meta: PeripheralMeta,
}

/// One watering slot within a weekly schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week_index: u8,
    /// Start time as `HH:MM` on a 24-hour clock.
    pub water_time_military: String,
    pub water_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetIrrigationSchedule {
    pub irrigation_system_id: u64,
    pub daily_schedules: Vec<DailySchedule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnscheduledIrrigationRequest {
    pub irrigation_system_id: u64,
    pub duration_ms: u64,
}

/// Server-to-irrigation-system instruction to water now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationCommand {
    pub duration_ms: u64,
}

/// A decoded frame: the kind discriminator together with its body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    BasicResponse(BasicResponse),
    RegisterRpi(RegisterRpi),
    RegisterSoilMoistureSensor(RegisterSoilMoistureSensor),
    UpdatePeripheralOwnership(UpdatePeripheralOwnership),
    SendSoilMoistureMeasurement(SendSoilMoistureMeasurement),
    RegisterIrrigationSystem(RegisterIrrigationSystem),
    SetIrrigationSchedule(SetIrrigationSchedule),
    UnscheduledIrrigationRequest(UnscheduledIrrigationRequest),
    IrrigationCommand(IrrigationCommand),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Hello(_) => MessageKind::Hello,
            Message::BasicResponse(_) => MessageKind::BasicResponse,
            Message::RegisterRpi(_) => MessageKind::RegisterRpi,
            Message::RegisterSoilMoistureSensor(_) => MessageKind::RegisterSoilMoistureSensor,
            Message::UpdatePeripheralOwnership(_) => MessageKind::UpdatePeripheralOwnership,
            Message::SendSoilMoistureMeasurement(_) => MessageKind::SendSoilMoistureMeasurement,
            Message::RegisterIrrigationSystem(_) => MessageKind::RegisterIrrigationSystem,
            Message::SetIrrigationSchedule(_) => MessageKind::SetIrrigationSchedule,
            Message::UnscheduledIrrigationRequest(_) => MessageKind::UnscheduledIrrigationRequest,
            Message::IrrigationCommand(_) => MessageKind::IrrigationCommand,
        }
    }
}
