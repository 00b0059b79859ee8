//! Game simulation modules

pub mod map;
pub mod math;
pub mod monster;
pub mod physics;
pub mod player;
pub mod runner;
pub mod simulation;

pub use map::{MapError, MapSize, TileMap};
pub use monster::Monster;
pub use physics::{BodyHandle, BodyOwner, PhysicsWorld, Rect};
pub use player::Player;
pub use runner::{GameEvent, GameHandle, GameLoop};
pub use simulation::{ConnectionId, ConnectionState, Simulation};

/// Player speed in pixels per second
pub const PLAYER_VELOCITY: f32 = 100.0;
/// Side of the square player body, in pixels
pub const PLAYER_SIZE: f32 = 16.0;
pub const PLAYER_MAX_HEALTH: i32 = 100;
pub const PLAYER_ATTACK_DAMAGE: i32 = 10;

pub const MONSTER_SIZE: f32 = 16.0;
pub const MONSTER_MAX_HEALTH: i32 = 4;
/// Monster speed in pixels per physics step
pub const MONSTER_SPEED: f32 = 1.0;
/// A monster picks a new heading at most this often
pub const MONSTER_MOVE_INTERVAL_MS: f64 = 2000.0;
pub const MONSTER_COUNT: usize = 5;

pub const SPAWN_MAX_ATTEMPTS: u32 = 256;
/// Inputs claiming a longer frame than this are rejected
pub const MAX_INPUT_TIME_DELTA_MS: f32 = 1000.0;

/// Result of applying damage to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    Survived,
    /// Health reached zero with this hit
    Killed,
    /// The entity was already dead; nothing changed
    AlreadyDead,
}

/// Health pool clamped to `[0, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    current: i32,
    max: i32,
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self { current: max, max }
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0
    }

    pub fn apply_damage(&mut self, amount: i32) -> DamageOutcome {
        if self.is_dead() {
            return DamageOutcome::AlreadyDead;
        }

        self.current = (self.current - amount).clamp(0, self.max);
        if self.is_dead() {
            DamageOutcome::Killed
        } else {
            DamageOutcome::Survived
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_kill_reported_once() {
        let mut health = Health::new(4);
        assert_eq!(health.apply_damage(3), DamageOutcome::Survived);
        assert_eq!(health.current(), 1);
        assert_eq!(health.apply_damage(10), DamageOutcome::Killed);
        assert_eq!(health.current(), 0);
        assert_eq!(health.apply_damage(1), DamageOutcome::AlreadyDead);
        assert_eq!(health.current(), 0);
    }

    #[test]
    fn test_health_never_exceeds_max() {
        let mut health = Health::new(10);
        assert_eq!(health.apply_damage(-5), DamageOutcome::Survived);
        assert_eq!(health.current(), 10);
        assert_eq!(health.max(), 10);
    }
}
