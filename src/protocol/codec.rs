//! Frame codec
//!
//! A frame is a fixed header (message-kind code and payload length, both
//! big-endian `u32`) followed by the JSON-encoded message body.

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;
use crate::protocol::messages::{Message, MessageKind};

/// Size of the kind + length header in bytes.
pub const HEADER_LEN: usize = 8;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: u32,
    pub len: usize,
}

impl FrameHeader {
    /// Reads a header from the front of `buf` without consuming it.
    pub fn peek(buf: &[u8]) -> Option<Self> {
        let header = buf.get(..HEADER_LEN)?;
        let (kind, len) = header.split_at(4);
        let kind = u32::from_be_bytes(kind.try_into().ok()?);
        let len = u32::from_be_bytes(len.try_into().ok()?);
        Some(Self {
            kind,
            len: usize::try_from(len).unwrap_or(usize::MAX),
        })
    }
}

/// Encodes a message into a complete frame.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let payload = match message {
        Message::Hello(body) => to_payload(body)?,
        Message::BasicResponse(body) => to_payload(body)?,
        Message::RegisterRpi(body) => to_payload(body)?,
        Message::RegisterSoilMoistureSensor(body) => to_payload(body)?,
        Message::UpdatePeripheralOwnership(body) => to_payload(body)?,
        Message::SendSoilMoistureMeasurement(body) => to_payload(body)?,
        Message::RegisterIrrigationSystem(body) => to_payload(body)?,
        Message::SetIrrigationSchedule(body) => to_payload(body)?,
        Message::UnscheduledIrrigationRequest(body) => to_payload(body)?,
        Message::IrrigationCommand(body) => to_payload(body)?,
    };

    let len = u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(message.kind().code());
    frame.put_u32(len);
    frame.put_slice(&payload);
    Ok(frame.to_vec())
}

/// Decodes a payload according to the kind code from its header.
pub fn decode(kind: u32, payload: &[u8]) -> Result<Message, CodecError> {
    let kind = MessageKind::from_code(kind).ok_or(CodecError::UnknownMessageKind(kind))?;
    let message = match kind {
        MessageKind::Hello => Message::Hello(from_payload(payload)?),
        MessageKind::BasicResponse => Message::BasicResponse(from_payload(payload)?),
        MessageKind::RegisterRpi => Message::RegisterRpi(from_payload(payload)?),
        MessageKind::RegisterSoilMoistureSensor => {
            Message::RegisterSoilMoistureSensor(from_payload(payload)?)
        }
        MessageKind::UpdatePeripheralOwnership => {
            Message::UpdatePeripheralOwnership(from_payload(payload)?)
        }
        MessageKind::SendSoilMoistureMeasurement => {
            Message::SendSoilMoistureMeasurement(from_payload(payload)?)
        }
        MessageKind::RegisterIrrigationSystem => {
            Message::RegisterIrrigationSystem(from_payload(payload)?)
        }
        MessageKind::SetIrrigationSchedule => Message::SetIrrigationSchedule(from_payload(payload)?),
        MessageKind::UnscheduledIrrigationRequest => {
            Message::UnscheduledIrrigationRequest(from_payload(payload)?)
        }
        MessageKind::IrrigationCommand => Message::IrrigationCommand(from_payload(payload)?),
    };
    Ok(message)
}

fn to_payload<T: Serialize>(body: &T) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(body)?)
}

fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Accumulates stream bytes and yields whole frames.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_payload: usize,
}

impl FrameBuffer {
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when [`next_message`](Self::next_message) would return something
    /// other than `Ok(None)`: a whole frame, or a header that is already
    /// known to be invalid.
    pub fn has_frame(&self) -> bool {
        match FrameHeader::peek(&self.buf) {
            None => false,
            Some(header) if header.len > self.max_payload => true,
            Some(header) => self.buf.len() - HEADER_LEN >= header.len,
        }
    }

    /// Pops and decodes the next complete frame, if one is buffered.
    pub fn next_message(&mut self) -> Result<Option<Message>, CodecError> {
        let Some(header) = FrameHeader::peek(&self.buf) else {
            return Ok(None);
        };
        if header.len > self.max_payload {
            return Err(CodecError::FrameTooLarge {
                len: header.len,
                max: self.max_payload,
            });
        }
        if self.buf.len() - HEADER_LEN < header.len {
            return Ok(None);
        }

        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(header.len);
        decode(header.kind, &payload).map(Some)
    }
}
