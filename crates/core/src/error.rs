//! Error types for draftden core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Card data error: {0}")]
    CardData(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
