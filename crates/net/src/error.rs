//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame too large: {0} bytes (max {max})", max = crate::frame::MAX_PAYLOAD_SIZE)]
    FrameTooLarge(usize),

    #[error("Not connected")]
    NotConnected,
}
