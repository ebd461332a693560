//! Client session
//!
//! A live connection together with its classification state.

use std::io;

use crate::client::state::{Classification, ClientKind};
use crate::error::{ClassificationError, ReadError};
use crate::protocol::Message;
use crate::transport::{Connection, Handle};

/// Owns one connection exclusively; dropping the session closes it.
pub struct Session {
    connection: Box<dyn Connection>,
    classification: Classification,
}

impl Session {
    /// Wraps a freshly accepted connection. Every session starts unclassified.
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            connection,
            classification: Classification::Unclassified,
        }
    }

    pub fn handle(&self) -> Handle {
        self.connection.handle()
    }

    pub fn peer(&self) -> String {
        self.connection.peer()
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Performs the one-shot `Unclassified -> Classified` transition.
    ///
    /// A second attempt is refused; it is never treated as a no-op, even when
    /// it repeats the same kind and id.
    pub fn classify(&mut self, kind: ClientKind, id: u64) -> Result<(), ClassificationError> {
        if let Classification::Classified { kind, id } = self.classification {
            return Err(ClassificationError::AlreadyClassified { kind, id });
        }
        self.classification = Classification::Classified { kind, id };
        Ok(())
    }

    pub fn is_classified_as(&self, kind: ClientKind, id: u64) -> bool {
        self.classification == Classification::Classified { kind, id }
    }

    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        self.connection.as_mut()
    }

    pub fn read_message(&mut self) -> Result<Message, ReadError> {
        self.connection.read_message()
    }

    pub async fn send(&mut self, message: &Message) -> io::Result<()> {
        self.connection.write_message(message).await
    }
}
