//! Vector arithmetic, directions and the shared movement function

use std::collections::BTreeSet;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

use super::PLAYER_VELOCITY;

/// 2D vector in world pixels. Positive y points down (screen space).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vector2) -> f32 {
        let d = other - self;
        (d.x * d.x + d.y * d.y).sqrt()
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vector2 {
    type Output = Vector2;

    fn mul(self, scalar: f32) -> Vector2 {
        Vector2::new(self.x * scalar, self.y * scalar)
    }
}

/// Four-way facing / movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit vector in screen space (up is negative y)
    pub fn unit(self) -> Vector2 {
        match self {
            Direction::Up => Vector2::new(0.0, -1.0),
            Direction::Down => Vector2::new(0.0, 1.0),
            Direction::Left => Vector2::new(-1.0, 0.0),
            Direction::Right => Vector2::new(1.0, 0.0),
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }

    /// Derive the movement direction from held keys.
    ///
    /// Priority is UP > DOWN > LEFT > RIGHT; the first held key in that order
    /// wins. Returns `None` when no directional key is held.
    pub fn from_keys(keys: &KeySet) -> Option<Direction> {
        if keys.contains(Key::Up) {
            Some(Direction::Up)
        } else if keys.contains(Key::Down) {
            Some(Direction::Down)
        } else if keys.contains(Key::Left) {
            Some(Direction::Left)
        } else if keys.contains(Key::Right) {
            Some(Direction::Right)
        } else {
            None
        }
    }
}

/// Input key as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Attack,
}

/// Set of keys held during one client frame
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet(BTreeSet<Key>);

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Key) -> bool {
        self.0.insert(key)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.0.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Key; N]> for KeySet {
    fn from(keys: [Key; N]) -> Self {
        keys.into_iter().collect()
    }
}

/// Displacement produced by holding `direction` for `time_delta_ms`.
///
/// Server and client predictor both integrate through this function, so the
/// arithmetic (and therefore the rounding) is identical on both ends.
pub fn movement_delta(direction: Direction, time_delta_ms: f32) -> Vector2 {
    direction.unit() * (PLAYER_VELOCITY * time_delta_ms / 1000.0)
}
