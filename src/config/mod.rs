//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::game::{MapSize, Rect, MONSTER_COUNT};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Allowed client origins for CORS, comma separated; any origin when unset
    pub client_origin: Option<String>,
    /// Max client messages per second per connection
    pub input_rate_limit: u32,
    pub game: GameConfig,
}

/// Log output style, from `LOG_FORMAT`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event, for log collectors
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid("LOG_FORMAT")),
        }
    }
}

/// Settings for one game instance
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Tiled JSON map; a bare world of `map_size` is used when absent
    pub map_path: Option<PathBuf>,
    pub map_size: MapSize,
    /// Layer of the tile map whose tiles are solid
    pub collision_layer: String,
    /// Extra static colliders added on top of the map
    pub obstacles: Vec<Rect>,
    pub physics_tps: u32,
    pub broadcast_tps: u32,
    pub monster_count: usize,
    /// Fixed seed for spawn positions, ids and monster AI
    pub world_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            map_path: None,
            map_size: MapSize::new(800.0, 640.0),
            collision_layer: "nature".to_string(),
            obstacles: Vec::new(),
            physics_tps: 60,
            broadcast_tps: 22,
            monster_count: MONSTER_COUNT,
            world_seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            map_path: lookup("MAP_PATH").map(PathBuf::from),
            map_size: MapSize::new(
                parse_or(&lookup, "MAP_WIDTH", defaults.map_size.width)?,
                parse_or(&lookup, "MAP_HEIGHT", defaults.map_size.height)?,
            ),
            collision_layer: lookup("COLLISION_LAYER").unwrap_or(defaults.collision_layer),
            obstacles: Vec::new(),
            physics_tps: positive(parse_or(&lookup, "PHYSICS_TPS", defaults.physics_tps)?, "PHYSICS_TPS")?,
            broadcast_tps: positive(
                parse_or(&lookup, "BROADCAST_TPS", defaults.broadcast_tps)?,
                "BROADCAST_TPS",
            )?,
            monster_count: parse_or(&lookup, "MONSTER_COUNT", defaults.monster_count)?,
            world_seed: lookup("WORLD_SEED")
                .map(|raw| raw.parse().map_err(|_| ConfigError::Invalid("WORLD_SEED")))
                .transpose()?,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: lookup("LOG_FORMAT")
                .map(|raw| raw.parse::<LogFormat>())
                .transpose()?
                .unwrap_or_default(),
            client_origin: lookup("CLIENT_ORIGIN").filter(|origin| !origin.trim().is_empty()),
            input_rate_limit: positive(
                parse_or(&lookup, "INPUT_RATE_LIMIT", 240)?,
                "INPUT_RATE_LIMIT",
            )?,
            game,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn positive(value: u32, key: &'static str) -> Result<u32, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(key));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.client_origin, None);
        assert_eq!(config.input_rate_limit, 240);
        assert_eq!(config.game.physics_tps, 60);
        assert_eq!(config.game.broadcast_tps, 22);
        assert_eq!(config.game.monster_count, 5);
        assert_eq!(config.game.collision_layer, "nature");
        assert_eq!(config.game.map_size, MapSize::new(800.0, 640.0));
        assert_eq!(config.game.world_seed, None);
    }

    #[test]
    fn test_port_overrides_server_addr() {
        let config = config_from(&[("PORT", "4000"), ("SERVER_ADDR", "127.0.0.1:9000")]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:4000".parse().unwrap());
    }

    #[test]
    fn test_game_overrides() {
        let config = config_from(&[
            ("MONSTER_COUNT", "0"),
            ("WORLD_SEED", "42"),
            ("MAP_PATH", "assets/map.json"),
            ("BROADCAST_TPS", "10"),
        ])
        .unwrap();
        assert_eq!(config.game.monster_count, 0);
        assert_eq!(config.game.world_seed, Some(42));
        assert_eq!(config.game.map_path, Some(PathBuf::from("assets/map.json")));
        assert_eq!(config.game.broadcast_tps, 10);
    }

    #[test]
    fn test_log_format() {
        let config = config_from(&[("LOG_FORMAT", "JSON")]).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(matches!(
            config_from(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::Invalid("LOG_FORMAT"))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            config_from(&[("PHYSICS_TPS", "fast")]),
            Err(ConfigError::Invalid("PHYSICS_TPS"))
        ));
        assert!(matches!(
            config_from(&[("BROADCAST_TPS", "0")]),
            Err(ConfigError::Invalid("BROADCAST_TPS"))
        ));
        assert!(matches!(
            config_from(&[("SERVER_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddress)
        ));
    }
}
