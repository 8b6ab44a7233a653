//! draftden Network Library
//!
//! The wire contract between draftden servers and clients.
//!
//! # Architecture
//!
//! - **Envelope**: 2-byte big-endian header - a 15-bit payload length plus
//!   a zlib-compression flag - followed by a JSON payload (`frame`)
//! - **Catalog**: typed `ClientToServer` / `ServerToClient` messages
//!   (`protocol`)
//! - **Client**: a reference connection handle used by tests (`client`)

pub mod client;
pub mod error;
pub mod frame;
pub mod protocol;

pub use client::{Client, ClientEvent};
pub use error::{Error, Result};
pub use frame::{read_frame, write_frame};
pub use protocol::{ClientToServer, ServerToClient};

/// Default port for draftden servers.
pub const DEFAULT_PORT: u16 = 53332;
