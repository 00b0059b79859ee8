//! Monster entity: random-walk controller

use rand::Rng;
use uuid::{Builder, Uuid};

use super::math::{Direction, Vector2};
use super::physics::{BodyHandle, BodyOwner, PhysicsWorld};
use super::{DamageOutcome, Health, MONSTER_MAX_HEALTH, MONSTER_MOVE_INTERVAL_MS, MONSTER_SIZE, MONSTER_SPEED};
use crate::ws::protocol::MonsterSnapshot;

#[derive(Debug)]
pub struct Monster {
    id: Uuid,
    body: BodyHandle,
    health: Health,
    last_move_ms: f64,
    heading: Option<Direction>,
    destroyed: bool,
}

impl Monster {
    pub fn spawn<R: Rng>(world: &mut PhysicsWorld, rng: &mut R, now_ms: f64) -> Self {
        let position = world.get_valid_spawn_position(rng, MONSTER_SIZE);
        let id = Builder::from_random_bytes(rng.gen()).into_uuid();
        Self::spawn_at(world, id, position, now_ms)
    }

    pub fn spawn_at(world: &mut PhysicsWorld, id: Uuid, position: Vector2, now_ms: f64) -> Self {
        let body = world.create_body(BodyOwner::Monster(id), position, MONSTER_SIZE, MONSTER_SIZE);
        Self {
            id,
            body,
            health: Health::new(MONSTER_MAX_HEALTH),
            last_move_ms: now_ms,
            heading: None,
            destroyed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn health(&self) -> i32 {
        self.health.current()
    }

    pub fn heading(&self) -> Option<Direction> {
        self.heading
    }

    /// Pick a new random heading every interval; otherwise keep drifting
    /// until blocked.
    pub fn update<R: Rng>(&mut self, now_ms: f64, rng: &mut R, world: &mut PhysicsWorld) {
        if now_ms - self.last_move_ms >= MONSTER_MOVE_INTERVAL_MS {
            let direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
            self.heading = Some(direction);
            self.last_move_ms = now_ms;
            world.set_velocity(self.body, direction.unit() * MONSTER_SPEED);
            return;
        }

        if let Some(direction) = self.heading {
            if world.is_blocked(self.body, direction) {
                self.heading = None;
                world.set_velocity(self.body, Vector2::ZERO);
            }
        }
    }

    pub fn deal_damage(&mut self, amount: i32) -> DamageOutcome {
        if self.destroyed {
            return DamageOutcome::AlreadyDead;
        }
        self.health.apply_damage(amount)
    }

    pub fn destroy(&mut self, world: &mut PhysicsWorld) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        world.remove_body(self.body)
    }

    pub fn snapshot(&self, world: &PhysicsWorld) -> MonsterSnapshot {
        MonsterSnapshot {
            position: world.position(self.body).unwrap_or_default(),
            health: self.health.current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::MapSize;
    use crate::game::physics::Rect;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_heading_changes_only_after_interval() {
        let mut world = PhysicsWorld::new(MapSize::new(400.0, 400.0));
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut monster = Monster::spawn_at(&mut world, Uuid::new_v4(), Vector2::new(200.0, 200.0), 0.0);

        monster.update(1999.0, &mut rng, &mut world);
        assert_eq!(monster.heading(), None);
        assert_eq!(world.velocity(monster.body()), Some(Vector2::ZERO));

        monster.update(2000.0, &mut rng, &mut world);
        let heading = monster.heading().unwrap();
        assert_eq!(world.velocity(monster.body()), Some(heading.unit() * MONSTER_SPEED));

        // Between intervals the velocity is left alone
        monster.update(3000.0, &mut rng, &mut world);
        assert_eq!(monster.heading(), Some(heading));
    }

    #[test]
    fn test_blocked_monster_stops() {
        let mut world = PhysicsWorld::new(MapSize::new(400.0, 400.0));
        // Walls on every side of the monster
        world.add_static(Rect::from_corner(0.0, 0.0, 400.0, 192.0));
        world.add_static(Rect::from_corner(0.0, 208.0, 400.0, 192.0));
        world.add_static(Rect::from_corner(0.0, 192.0, 192.0, 16.0));
        world.add_static(Rect::from_corner(208.0, 192.0, 192.0, 16.0));

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut monster = Monster::spawn_at(&mut world, Uuid::new_v4(), Vector2::new(200.0, 200.0), 0.0);

        monster.update(2000.0, &mut rng, &mut world);
        assert!(monster.heading().is_some());
        monster.update(2016.0, &mut rng, &mut world);

        assert_eq!(monster.heading(), None);
        assert_eq!(world.velocity(monster.body()), Some(Vector2::ZERO));
    }

    #[test]
    fn test_monster_dies_once() {
        let mut world = PhysicsWorld::new(MapSize::new(400.0, 400.0));
        let mut monster = Monster::spawn_at(&mut world, Uuid::new_v4(), Vector2::new(50.0, 50.0), 0.0);

        assert_eq!(monster.deal_damage(10), DamageOutcome::Killed);
        assert_eq!(monster.deal_damage(10), DamageOutcome::AlreadyDead);
        assert!(monster.destroy(&mut world));
        assert!(!monster.destroy(&mut world));
        assert_eq!(monster.snapshot(&world).health, 0);
    }
}
