//! Lifecycle game server library
//!
//! Authoritative real-time simulation for the Lifecycle multiplayer game:
//! - fixed-rate physics with buffered, sequenced client input
//! - fixed-rate state broadcast over WebSockets
//! - engine-agnostic client prediction and reconciliation

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;

pub use config::Config;
pub use error::{GameError, ProtocolError};
