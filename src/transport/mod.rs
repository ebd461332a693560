//! Framed transport
//!
//! The capabilities the event loop needs from the network: a listening
//! endpoint that can report accept-readiness, and connections that can report
//! read-readiness, yield one decoded message, and write one message.

pub mod tcp;

use std::fmt;
use std::io;
use std::task::{Context, Poll};

use async_trait::async_trait;

use crate::error::ReadError;
use crate::protocol::Message;

pub use tcp::{TcpAcceptor, TcpConnection};

/// Readiness handle identifying one endpoint for as long as it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One accepted, already-authenticated, message-framed connection.
///
/// Dropping a connection closes it.
#[async_trait]
pub trait Connection: Send {
    fn handle(&self) -> Handle;

    /// Peer description for log lines.
    fn peer(&self) -> String;

    /// Ready once [`read_message`](Self::read_message) can return without
    /// waiting: a whole frame is buffered, or the stream ended or failed.
    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()>;

    /// Takes the next message. Only meaningful after `poll_readable` reported
    /// ready.
    fn read_message(&mut self) -> Result<Message, ReadError>;

    async fn write_message(&mut self, message: &Message) -> io::Result<()>;
}

/// The listening endpoint.
#[async_trait]
pub trait Listener: Send {
    /// Ready when an accept attempt is pending. An `Err` means the endpoint
    /// itself can no longer be waited on.
    fn poll_acceptable(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>>;

    /// Completes the pending accept. Failures here concern a single incoming
    /// connection and leave the listener usable.
    async fn accept(&mut self) -> io::Result<Box<dyn Connection>>;
}
