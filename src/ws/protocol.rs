//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::game::math::{KeySet, Vector2};
use crate::game::MAX_INPUT_TIME_DELTA_MS;

/// Transient action flag, cleared after every broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerAction {
    Attack,
}

/// One client frame worth of held keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInput {
    pub keys: KeySet,
    /// Milliseconds since the previous client frame
    pub time_delta: f32,
    /// Per-connection, strictly increasing, starts at 0
    pub sequence_number: u32,
}

impl PlayerInput {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.time_delta.is_finite()
            || self.time_delta < 0.0
            || self.time_delta > MAX_INPUT_TIME_DELTA_MS
        {
            return Err(ProtocolError::InvalidTimeDelta(self.time_delta));
        }
        if self.keys.is_empty() {
            return Err(ProtocolError::EmptyInput);
        }
        Ok(())
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMsg {
    /// Keys held during one rendered frame
    PlayerInput(PlayerInput),

    /// Request a fresh player after death
    RestartGame,
}

impl ClientMsg {
    /// Decode and validate a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let msg: ClientMsg = serde_json::from_str(text)?;
        if let ClientMsg::PlayerInput(input) = &msg {
            input.validate()?;
        }
        Ok(msg)
    }
}

/// Public player state; the only player data that leaves the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub position: Vector2,
    pub health: i32,
    /// `None` until the first input has been processed
    pub last_processed_input_sequence: Option<u32>,
    pub pending_action: Option<PlayerAction>,
    pub name: String,
}

/// Public monster state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterSnapshot {
    pub position: Vector2,
    pub health: i32,
}

pub type PlayerSnapshots = HashMap<Uuid, PlayerSnapshot>;
pub type MonsterSnapshots = HashMap<Uuid, MonsterSnapshot>;

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMsg {
    /// Sent once to a freshly connected (or restarted) connection
    #[serde(rename_all = "camelCase")]
    InitialGameState {
        player_id: Uuid,
        players: PlayerSnapshots,
        monsters: MonsterSnapshots,
    },

    /// Authoritative state, broadcast at the fixed network rate
    GameState {
        players: PlayerSnapshots,
        monsters: MonsterSnapshots,
    },

    /// Broadcast to everyone except the joining connection
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player_id: Uuid,
        player: PlayerSnapshot,
    },

    /// Broadcast to everyone except the leaving connection
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_id: Uuid,
        player: PlayerSnapshot,
    },

    /// Broadcast to everyone when a player's health reaches zero
    #[serde(rename_all = "camelCase")]
    PlayerDied { player_id: Uuid },
}

impl ServerMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMsg::InitialGameState { .. } => "INITIAL_GAME_STATE",
            ServerMsg::GameState { .. } => "GAME_STATE",
            ServerMsg::PlayerJoined { .. } => "PLAYER_JOINED",
            ServerMsg::PlayerLeft { .. } => "PLAYER_LEFT",
            ServerMsg::PlayerDied { .. } => "PLAYER_DIED",
        }
    }
}
