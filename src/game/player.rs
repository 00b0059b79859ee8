//! Player entity: input processing, melee swing, damage and public snapshot

use rand::Rng;
use uuid::{Builder, Uuid};

use super::math::{movement_delta, Direction, Key, Vector2};
use super::physics::{BodyHandle, BodyOwner, PhysicsWorld, Rect};
use super::{DamageOutcome, Health, PLAYER_MAX_HEALTH, PLAYER_SIZE};
use crate::ws::protocol::{PlayerAction, PlayerInput, PlayerSnapshot};

/// What happened to a single buffered input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputOutcome {
    /// Sequence number at or below the last processed one; nothing applied
    Stale,
    /// Applied; carries the swing hitbox when the input held ATTACK
    Applied { attack: Option<Rect> },
}

/// Server-side player state. Only [`PlayerSnapshot`] ever leaves the server.
#[derive(Debug)]
pub struct Player {
    id: Uuid,
    name: String,
    body: BodyHandle,
    health: Health,
    last_processed_input: Option<u32>,
    pending_action: Option<PlayerAction>,
    facing: Direction,
    destroyed: bool,
}

impl Player {
    /// Create a player at a collision-free spot, with an id drawn from `rng`
    pub fn spawn<R: Rng>(world: &mut PhysicsWorld, rng: &mut R, name: String) -> Self {
        let position = world.get_valid_spawn_position(rng, PLAYER_SIZE);
        let id = Builder::from_random_bytes(rng.gen()).into_uuid();
        Self::spawn_at(world, id, name, position)
    }

    pub fn spawn_at(world: &mut PhysicsWorld, id: Uuid, name: String, position: Vector2) -> Self {
        let body = world.create_body(BodyOwner::Player(id), position, PLAYER_SIZE, PLAYER_SIZE);
        Self {
            id,
            name,
            body,
            health: Health::new(PLAYER_MAX_HEALTH),
            last_processed_input: None,
            pending_action: None,
            facing: Direction::Down,
            destroyed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn health(&self) -> i32 {
        self.health.current()
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn last_processed_input(&self) -> Option<u32> {
        self.last_processed_input
    }

    pub fn pending_action(&self) -> Option<PlayerAction> {
        self.pending_action
    }

    pub fn clear_pending_action(&mut self) {
        self.pending_action = None;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn position(&self, world: &PhysicsWorld) -> Vector2 {
        world.position(self.body).unwrap_or_default()
    }

    /// Apply one buffered input.
    ///
    /// Movement adds `movement_delta` to the body velocity, which the tick
    /// zeroed beforehand, so several inputs in one tick accumulate. Damage
    /// from the swing is resolved by the caller against the returned hitbox.
    pub fn process_input(&mut self, input: &PlayerInput, world: &mut PhysicsWorld) -> InputOutcome {
        if matches!(self.last_processed_input, Some(last) if input.sequence_number <= last) {
            return InputOutcome::Stale;
        }

        if let Some(direction) = Direction::from_keys(&input.keys) {
            self.facing = direction;
            let velocity = world.velocity(self.body).unwrap_or_default()
                + movement_delta(direction, input.time_delta);
            world.set_velocity(self.body, velocity);
        }

        let attack = if input.keys.contains(Key::Attack) {
            self.pending_action = Some(PlayerAction::Attack);
            self.attack_hitbox(world)
        } else {
            None
        };

        self.last_processed_input = Some(input.sequence_number);
        InputOutcome::Applied { attack }
    }

    /// Melee swing area in front of the player, 3:1 across the facing axis
    pub fn attack_hitbox(&self, world: &PhysicsWorld) -> Option<Rect> {
        let center = world.position(self.body)? + self.facing.unit() * (PLAYER_SIZE / 2.0);
        let (across, along) = (PLAYER_SIZE * 1.5, PLAYER_SIZE / 2.0);
        let rect = if self.facing.is_vertical() {
            Rect::centered(center, across, along)
        } else {
            Rect::centered(center, along, across)
        };
        Some(rect)
    }

    pub fn deal_damage(&mut self, amount: i32) -> DamageOutcome {
        if self.destroyed {
            return DamageOutcome::AlreadyDead;
        }
        self.health.apply_damage(amount)
    }

    /// Remove the body from the world; returns false if already destroyed
    pub fn destroy(&mut self, world: &mut PhysicsWorld) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        world.remove_body(self.body)
    }

    pub fn snapshot(&self, world: &PhysicsWorld) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.position(world),
            health: self.health.current(),
            last_processed_input_sequence: self.last_processed_input,
            pending_action: self.pending_action,
            name: self.name.clone(),
        }
    }
}
