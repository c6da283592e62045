//! Error kinds shared across the transport, collector and client.

use std::io;
use thiserror::Error;

/// The five error kinds from the transport's error handling design.
#[derive(Debug, Error)]
pub enum Error {
    /// Certificate, key, or address configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Dial failure, handshake mismatch, or handshake I/O failure.
    #[error("connect error: {0}")]
    Connect(String),

    /// Bad magic, wrong version, or unexpected byte count on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Read/write EOF or I/O failure mid-session.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The ack reader observed more acknowledged bytes than were queued.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn connect(msg: impl Into<String>) -> Self {
        Error::Connect(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// True if the underlying cause was an EOF, which callers log differently from
    /// other I/O failures ("closed by remote" vs. a generic warning).
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Transport(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
