//! Collision world: static map colliders and dynamic entity bodies

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{trace, warn};
use uuid::Uuid;

use super::map::MapSize;
use super::math::{Direction, Vector2};
use super::SPAWN_MAX_ATTEMPTS;

/// Bisection rounds used to find the contact point of a blocked sweep
const CONTACT_BISECT_ITERATIONS: u32 = 16;

/// Axis-aligned rectangle described by its center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub center: Vector2,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn centered(center: Vector2, width: f32, height: f32) -> Self {
        Self {
            center,
            width,
            height,
        }
    }

    /// Build from a top-left corner, the way tile maps describe geometry
    pub fn from_corner(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::centered(
            Vector2::new(x + width / 2.0, y + height / 2.0),
            width,
            height,
        )
    }

    pub fn left(&self) -> f32 {
        self.center.x - self.width / 2.0
    }

    pub fn right(&self) -> f32 {
        self.center.x + self.width / 2.0
    }

    pub fn top(&self) -> f32 {
        self.center.y - self.height / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.center.y + self.height / 2.0
    }

    /// Strict AABB overlap: rectangles that only share an edge do not intersect
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() <= other.left()
            || other.right() <= self.left()
            || self.bottom() <= other.top()
            || other.bottom() <= self.top())
    }

    pub fn moved_to(&self, center: Vector2) -> Rect {
        Rect { center, ..*self }
    }
}

/// Opaque handle to a dynamic body
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyHandle(u64);

/// Entity a dynamic body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyOwner {
    Player(Uuid),
    Monster(Uuid),
}

#[derive(Debug, Clone)]
struct Body {
    owner: BodyOwner,
    rect: Rect,
    /// Pixels per step
    velocity: Vector2,
}

/// Physics world holding the map's static colliders and all entity bodies.
///
/// Bodies are integrated by [`PhysicsWorld::step`] and only collide with
/// static geometry and the world bounds; entity/entity contact is answered
/// by [`PhysicsWorld::overlapping_bodies`] queries instead.
#[derive(Debug)]
pub struct PhysicsWorld {
    size: MapSize,
    statics: Vec<Rect>,
    bodies: BTreeMap<BodyHandle, Body>,
    next_handle: u64,
}

impl PhysicsWorld {
    pub fn new(size: MapSize) -> Self {
        Self {
            size,
            statics: Vec::new(),
            bodies: BTreeMap::new(),
            next_handle: 1,
        }
    }

    pub fn size(&self) -> MapSize {
        self.size
    }

    pub fn add_static(&mut self, collider: Rect) {
        self.statics.push(collider);
    }

    pub fn static_count(&self) -> usize {
        self.statics.len()
    }

    pub fn create_body(
        &mut self,
        owner: BodyOwner,
        center: Vector2,
        width: f32,
        height: f32,
    ) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.bodies.insert(
            handle,
            Body {
                owner,
                rect: Rect::centered(center, width, height),
                velocity: Vector2::ZERO,
            },
        );
        handle
    }

    /// Remove a body; returns false if it was already gone
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies.remove(&handle).is_some()
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(&handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vector2> {
        self.bodies.get(&handle).map(|b| b.rect.center)
    }

    pub fn rect(&self, handle: BodyHandle) -> Option<Rect> {
        self.bodies.get(&handle).map(|b| b.rect)
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vector2> {
        self.bodies.get(&handle).map(|b| b.velocity)
    }

    /// Move a body without sweeping; returns false for unknown handles
    pub fn set_position(&mut self, handle: BodyHandle, center: Vector2) -> bool {
        match self.bodies.get_mut(&handle) {
            Some(body) => {
                body.rect.center = center;
                true
            }
            None => false,
        }
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, velocity: Vector2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.velocity = velocity;
        }
    }

    /// True if a `width`×`height` rectangle centered at `position` overlaps
    /// a static collider or leaves the map bounds.
    pub fn check_collision(&self, position: Vector2, width: f32, height: f32) -> bool {
        self.rect_collides(&Rect::centered(position, width, height))
    }

    fn rect_collides(&self, rect: &Rect) -> bool {
        self.out_of_bounds(rect) || self.statics.iter().any(|collider| collider.intersects(rect))
    }

    fn out_of_bounds(&self, rect: &Rect) -> bool {
        rect.left() < 0.0
            || rect.top() < 0.0
            || rect.right() > self.size.width
            || rect.bottom() > self.size.height
    }

    /// True if `candidate` touches geometry that `start` did not already overlap
    fn enters_new_geometry(&self, start: &Rect, candidate: &Rect) -> bool {
        (self.out_of_bounds(candidate) && !self.out_of_bounds(start))
            || self
                .statics
                .iter()
                .any(|collider| collider.intersects(candidate) && !collider.intersects(start))
    }

    /// True if moving the body one pixel towards `direction` would collide
    pub fn is_blocked(&self, handle: BodyHandle, direction: Direction) -> bool {
        match self.bodies.get(&handle) {
            Some(body) => {
                let probe = body.rect.moved_to(body.rect.center + direction.unit());
                self.rect_collides(&probe)
            }
            None => false,
        }
    }

    /// Every body intersecting `area`, each reported once, in handle order
    pub fn overlapping_bodies(
        &self,
        area: &Rect,
        exclude: Option<BodyHandle>,
    ) -> Vec<(BodyHandle, BodyOwner)> {
        self.bodies
            .iter()
            .filter(|(handle, _)| Some(**handle) != exclude)
            .filter(|(_, body)| body.rect.intersects(area))
            .map(|(handle, body)| (*handle, body.owner))
            .collect()
    }

    /// Advance every body by its velocity, stopping short of static geometry
    pub fn step(&mut self) {
        let handles: Vec<BodyHandle> = self.bodies.keys().copied().collect();

        for handle in handles {
            let Some(body) = self.bodies.get(&handle) else {
                continue;
            };
            if body.velocity == Vector2::ZERO {
                continue;
            }

            let rect = body.rect;
            let velocity = body.velocity;

            // Axis by axis so a diagonal push slides along walls
            let after_x = self.sweep(rect, Vector2::new(velocity.x, 0.0));
            let after_y = self.sweep(rect.moved_to(after_x), Vector2::new(0.0, velocity.y));

            if let Some(body) = self.bodies.get_mut(&handle) {
                body.rect.center = after_y;
            }
        }
    }

    /// Final center of `rect` after moving by `displacement`.
    ///
    /// The path is sampled in sub-steps no longer than a quarter of the
    /// body's smallest side; at the first blocked sample the contact point is
    /// bisected. An unobstructed sweep lands exactly on `center + displacement`.
    ///
    /// A body that starts inside geometry may walk out of it, but stops at
    /// the first sample touching any other collider; once out, the sweep
    /// continues as usual from the first free sample.
    fn sweep(&self, rect: Rect, displacement: Vector2) -> Vector2 {
        let length = (displacement.x * displacement.x + displacement.y * displacement.y).sqrt();
        if length == 0.0 {
            return rect.center;
        }

        let max_sub_step = (rect.width.min(rect.height) / 4.0).max(0.5);
        let sub_steps = (length / max_sub_step).ceil().max(1.0) as u32;

        let mut escaped = !self.rect_collides(&rect);
        if !escaped {
            trace!("body starts overlapping geometry");
        }

        let mut free_t = 0.0f32;
        for k in 1..=sub_steps {
            let t = k as f32 / sub_steps as f32;
            let candidate = rect.moved_to(rect.center + displacement * t);

            if !escaped {
                if self.enters_new_geometry(&rect, &candidate) {
                    return rect.center + displacement * free_t;
                }
                escaped = !self.rect_collides(&candidate);
                free_t = t;
                continue;
            }

            if self.rect_collides(&candidate) {
                let mut blocked_t = t;
                for _ in 0..CONTACT_BISECT_ITERATIONS {
                    let mid = (free_t + blocked_t) / 2.0;
                    if self.rect_collides(&rect.moved_to(rect.center + displacement * mid)) {
                        blocked_t = mid;
                    } else {
                        free_t = mid;
                    }
                }
                return rect.center + displacement * free_t;
            }
            free_t = t;
        }

        rect.center + displacement
    }

    /// Random collision-free center for a square body of `body_size`.
    ///
    /// Sampling is bounded; after [`SPAWN_MAX_ATTEMPTS`] misses the last
    /// sample is accepted even though it overlaps geometry.
    pub fn get_valid_spawn_position<R: Rng>(&self, rng: &mut R, body_size: f32) -> Vector2 {
        let half = body_size / 2.0;
        let max_x = (self.size.width - half).max(half);
        let max_y = (self.size.height - half).max(half);

        let mut candidate = Vector2::new(half, half);
        for _ in 0..SPAWN_MAX_ATTEMPTS {
            candidate = Vector2::new(rng.gen_range(half..=max_x), rng.gen_range(half..=max_y));
            if !self.check_collision(candidate, body_size, body_size) {
                return candidate;
            }
        }

        warn!(
            attempts = SPAWN_MAX_ATTEMPTS,
            x = candidate.x,
            y = candidate.y,
            "No free spawn position found, accepting overlapping spawn"
        );
        candidate
    }
}
