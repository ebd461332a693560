//! Error types
//!
//! Defines the error types for each layer of the server: the wire codec, the
//! transport read path, session classification, handler dispatch, the domain
//! store and the top-level server.

use std::io;

use thiserror::Error;

use crate::client::ClientKind;

/// Frame encoding and decoding failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The header carried a message-kind code this server does not know.
    #[error("unknown message kind code: {0}")]
    UnknownMessageKind(u32),

    /// The header announced a payload larger than the configured limit.
    #[error("frame payload of {len} bytes exceeds {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// The peer closed the stream part-way through a frame.
    #[error("connection closed with {buffered} bytes of an incomplete frame buffered")]
    TruncatedFrame { buffered: usize },

    /// The payload bytes did not match the message kind's body.
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Reasons a single message read can fail.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Orderly closure by the peer; not an error condition for the server.
    #[error("connection closed by peer")]
    PeerClosed,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("undecodable frame: {0}")]
    Codec(#[from] CodecError),
}

impl ReadError {
    /// Whether the read failed because the peer shut the connection down cleanly.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, ReadError::PeerClosed)
    }
}

/// A session may be classified exactly once.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("session already classified as {kind} (id {id})")]
    AlreadyClassified { kind: ClientKind, id: u64 },
}

/// Failures returned by a handler. Any of them evicts the calling session.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The message kind is not acceptable in the session's current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The handshake named the reserved unclassified pseudo-kind.
    #[error("handshake requested the reserved unknown client type")]
    InvalidHandshakeTarget,

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Domain store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An identifier did not fit the store's signed 64-bit key space.
    #[error("identifier {0} is out of range")]
    IdOutOfRange(u64),

    /// The store handed back a row id that cannot be an identifier.
    #[error("store produced invalid row id {0}")]
    InvalidRowId(i64),

    /// A handler panicked while holding the shared store.
    #[error("shared store lock poisoned")]
    Poisoned,
}

/// Top-level server failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open domain store: {0}")]
    Store(#[from] StoreError),

    /// The readiness wait itself failed; the event loop cannot continue.
    #[error("readiness wait failed: {0}")]
    Multiplex(#[source] io::Error),

    #[error("a handler is already bound for client kind {0}")]
    DuplicateHandler(ClientKind),
}
