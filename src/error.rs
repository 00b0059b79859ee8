//! Error types for the game server

use thiserror::Error;

use crate::config::ConfigError;
use crate::game::MapError;

/// Top-level error for setting up and running a game instance
#[derive(Error, Debug)]
pub enum GameError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Map error: {0}")]
    Map(#[from] MapError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected client messages. These are logged and dropped, never sent back.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid time delta: {0}")]
    InvalidTimeDelta(f32),

    #[error("Input without any key held")]
    EmptyInput,

    #[error("Binary frames are not supported")]
    BinaryFrame,
}
