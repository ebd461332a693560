//! Module `state`
//!
//! Defines the classification state of a session: the client roles a
//! connection can declare during its handshake, and the one-way transition
//! from anonymous to classified.

use std::fmt;

use crate::protocol::ClientType;

/// A role a connection can classify itself as.
///
/// The anonymous state is deliberately not a variant; it is represented by
/// [`Classification::Unclassified`] and can never be chosen as a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum ClientKind {
    /// Operator tooling that manages devices, peripherals and schedules.
    Control,
    /// A Raspberry Pi hub reporting sensor data.
    Rpi,
    /// An irrigation controller that accepts watering commands.
    IrrigationSystem,
}

impl ClientKind {
    /// Maps a wire client type onto a classifiable kind. `Unknown` has no
    /// counterpart.
    pub fn from_wire(client_type: ClientType) -> Option<Self> {
        match client_type {
            ClientType::Unknown => None,
            ClientType::Control => Some(ClientKind::Control),
            ClientType::Rpi => Some(ClientKind::Rpi),
            ClientType::IrrigationSystem => Some(ClientKind::IrrigationSystem),
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientKind::Control => "control",
            ClientKind::Rpi => "rpi",
            ClientKind::IrrigationSystem => "irrigation-system",
        };
        f.write_str(name)
    }
}

/// Where a session stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    #[default]
    Unclassified,
    Classified { kind: ClientKind, id: u64 },
}

impl Classification {
    pub fn is_classified(&self) -> bool {
        matches!(self, Classification::Classified { .. })
    }

    pub fn kind(&self) -> Option<ClientKind> {
        match self {
            Classification::Unclassified => None,
            Classification::Classified { kind, .. } => Some(*kind),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Unclassified => f.write_str("unclassified"),
            Classification::Classified { kind, id } => write!(f, "{}/{}", kind, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_wire_type_is_not_a_kind() {
        assert_eq!(ClientKind::from_wire(ClientType::Unknown), None);
        assert_eq!(
            ClientKind::from_wire(ClientType::Control),
            Some(ClientKind::Control)
        );
        assert_eq!(
            ClientKind::from_wire(ClientType::IrrigationSystem),
            Some(ClientKind::IrrigationSystem)
        );
    }

    #[test]
    fn default_classification_is_unclassified() {
        let state = Classification::default();
        assert!(!state.is_classified());
        assert_eq!(state.kind(), None);
    }
}
