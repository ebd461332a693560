//! TCP transport
//!
//! `tokio::net` backed implementations of [`Listener`] and [`Connection`].
//! Inbound bytes are pulled with non-blocking reads during the readiness poll
//! so a peer that trickles in half a frame never stalls the event loop.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Sleep, sleep};

use crate::error::{CodecError, ReadError};
use crate::protocol::{FrameBuffer, Message, encode};
use crate::transport::{Connection, Handle, Listener};

const READ_CHUNK: usize = 4096;

/// How long the listener stays quiet after running out of file descriptors.
const FD_EXHAUSTION_BACKOFF: Duration = Duration::from_millis(500);

/// Handle reserved for the listening socket; connections start above it.
pub const LISTENER_HANDLE: Handle = Handle(0);

/// Per-connection limits applied to every accepted stream.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_frame_bytes: usize,
    pub write_timeout: Duration,
}

pub struct TcpAcceptor {
    listener: TcpListener,
    pending: Option<io::Result<(TcpStream, SocketAddr)>>,
    backoff: Option<Pin<Box<Sleep>>>,
    next_handle: u64,
    limits: ConnectionLimits,
}

impl TcpAcceptor {
    pub async fn bind(addr: &str, limits: ConnectionLimits) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            pending: None,
            backoff: None,
            next_handle: LISTENER_HANDLE.0,
            limits,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Accept failures that concern one incoming connection rather than the
/// listening socket.
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || is_fd_exhaustion(err)
}

/// ENFILE or EMFILE. The pending connection stays queued in the kernel, so
/// accepting again right away fails the same way.
fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23 | 24))
}

#[async_trait]
impl Listener for TcpAcceptor {
    fn poll_acceptable(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(delay) = self.backoff.as_mut() {
            if Future::poll(delay.as_mut(), cx).is_pending() {
                return Poll::Pending;
            }
            self.backoff = None;
        }
        if self.pending.is_some() {
            return Poll::Ready(Ok(()));
        }
        match self.listener.poll_accept(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) if !is_transient_accept_error(&e) => Poll::Ready(Err(e)),
            Poll::Ready(result) => {
                self.pending = Some(result);
                Poll::Ready(Ok(()))
            }
        }
    }

    async fn accept(&mut self) -> io::Result<Box<dyn Connection>> {
        let accepted = match self.pending.take() {
            Some(result) => result,
            None => self.listener.accept().await,
        };
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                if is_fd_exhaustion(&e) {
                    warn!(
                        "Out of file descriptors; pausing accepts for {:?}",
                        FD_EXHAUSTION_BACKOFF
                    );
                    self.backoff = Some(Box::pin(sleep(FD_EXHAUSTION_BACKOFF)));
                }
                return Err(e);
            }
        };
        stream.set_nodelay(true)?;

        self.next_handle += 1;
        let handle = Handle(self.next_handle);
        debug!("Accepted {} as {}", peer, handle);
        Ok(Box::new(TcpConnection::new(stream, peer, handle, self.limits)))
    }
}

pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    handle: Handle,
    frames: FrameBuffer,
    eof: bool,
    failure: Option<io::Error>,
    write_timeout: Duration,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer: SocketAddr, handle: Handle, limits: ConnectionLimits) -> Self {
        Self {
            stream,
            peer,
            handle,
            frames: FrameBuffer::new(limits.max_frame_bytes),
            eof: false,
            failure: None,
            write_timeout: limits.write_timeout,
        }
    }

    fn has_outcome(&self) -> bool {
        self.frames.has_frame() || self.eof || self.failure.is_some()
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }

    fn poll_readable(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if self.has_outcome() {
                return Poll::Ready(());
            }
            match self.stream.poll_read_ready(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => {
                    self.failure = Some(e);
                    return Poll::Ready(());
                }
                Poll::Ready(Ok(())) => {}
            }
            // A WouldBlock here clears the stale readiness so the next
            // poll_read_ready registers the waker.
            match self.stream.try_read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => self.frames.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => self.failure = Some(e),
            }
        }
    }

    fn read_message(&mut self) -> Result<Message, ReadError> {
        if let Some(message) = self.frames.next_message()? {
            return Ok(message);
        }
        if let Some(e) = self.failure.take() {
            return Err(ReadError::Transport(e));
        }
        if self.eof {
            if self.frames.is_empty() {
                return Err(ReadError::PeerClosed);
            }
            return Err(ReadError::Codec(CodecError::TruncatedFrame {
                buffered: self.frames.buffered(),
            }));
        }
        Err(ReadError::Transport(io::ErrorKind::WouldBlock.into()))
    }

    async fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let frame = encode(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        match tokio::time::timeout(self.write_timeout, self.stream.write_all(&frame)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write to {} timed out", self.peer),
            )),
        }
    }
}
