//! draftden server library
//!
//! The hub owns every connection, the user and room directories, and all
//! rooms; it runs as a single task, so every mutation of shared state is
//! serialized through its event loop. Reader tasks decode frames and
//! forward typed events; writer tasks drain per-connection queues.

pub mod connection;
pub mod hub;
pub mod notices;
pub mod room;

pub use hub::{HubConfig, ServerHandle, ServerHub};
pub use notices::Notices;
