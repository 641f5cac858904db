//! Error types for the socket pool

use std::io;
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Socket pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Transport or handshake failure while dialing a new connection
    #[error("dial error: {0}")]
    Dial(#[from] io::Error),

    /// TLS configuration error
    #[error("TLS error: {0}")]
    Tls(String),

    /// All slots are currently leased
    #[error("pool exhausted: all {0} connections are leased")]
    Exhausted(usize),

    /// The pool has been closed
    #[error("pool is closed")]
    Closed,

    /// The pool was constructed with a capacity of zero
    #[error("pool capacity must be at least 1")]
    InvalidCapacity,

    /// One or more connections failed to shut down during close
    #[error("failed to close {} pooled connection(s)", .0.len())]
    Close(Vec<CloseFailure>),
}

/// A single slot's failure during pool close
#[derive(Debug, Error)]
#[error("slot {slot}: {source}")]
pub struct CloseFailure {
    /// Index of the slot whose connection could not be shut down
    pub slot: usize,
    /// The underlying shutdown error
    #[source]
    pub source: io::Error,
}

impl PoolError {
    /// Create a TLS error
    pub fn tls<S: Into<String>>(msg: S) -> Self {
        Self::Tls(msg.into())
    }
}
