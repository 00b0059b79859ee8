//! Authoritative simulation state: entities, input buffer and connections

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::error::GameError;
use crate::ws::protocol::{MonsterSnapshots, PlayerInput, PlayerSnapshot, PlayerSnapshots, ServerMsg};

use super::map::TileMap;
use super::math::Vector2;
use super::monster::Monster;
use super::physics::{BodyHandle, BodyOwner, PhysicsWorld, Rect};
use super::player::{InputOutcome, Player};
use super::{DamageOutcome, PLAYER_ATTACK_DAMAGE};

/// Identifies one transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Terminated,
}

/// Outbound half of a connection; the session's writer task drains it
pub type Outbound = mpsc::UnboundedSender<ServerMsg>;

#[derive(Debug)]
struct Connection {
    state: ConnectionState,
    name: String,
    /// `None` once the player died and before a restart
    player_id: Option<Uuid>,
    outbound: Outbound,
}

impl Connection {
    fn send(&self, msg: ServerMsg) {
        // Fire-and-forget; a closed receiver means the session is going away
        if self.outbound.send(msg).is_err() {
            trace!("Outbound channel closed, dropping message");
        }
    }
}

#[derive(Debug)]
struct QueuedInput {
    connection_id: ConnectionId,
    input: PlayerInput,
}

/// One game instance. Owns every entity; nothing else mutates them.
#[derive(Debug)]
pub struct Simulation {
    world: PhysicsWorld,
    players: BTreeMap<Uuid, Player>,
    monsters: BTreeMap<Uuid, Monster>,
    input_queue: VecDeque<QueuedInput>,
    connections: HashMap<ConnectionId, Connection>,
    elapsed_ms: f64,
    tick: u64,
    rng: ChaCha8Rng,
}

impl Simulation {
    /// Build the world described by `config` and populate its monsters
    pub fn from_config(config: &GameConfig) -> Result<Self, GameError> {
        let mut world = match &config.map_path {
            Some(path) => TileMap::load(path)?.build_world(&config.collision_layer)?,
            None => PhysicsWorld::new(config.map_size),
        };
        for obstacle in &config.obstacles {
            world.add_static(*obstacle);
        }

        let seed = config.world_seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!(seed, monsters = config.monster_count, "Creating simulation");

        Ok(Self::new(world, seed, config.monster_count))
    }

    pub fn new(world: PhysicsWorld, seed: u64, monster_count: usize) -> Self {
        let mut sim = Self {
            world,
            players: BTreeMap::new(),
            monsters: BTreeMap::new(),
            input_queue: VecDeque::new(),
            connections: HashMap::new(),
            elapsed_ms: 0.0,
            tick: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        for _ in 0..monster_count {
            sim.spawn_monster();
        }
        sim
    }

    pub fn spawn_monster(&mut self) -> Uuid {
        let monster = Monster::spawn(&mut self.world, &mut self.rng, self.elapsed_ms);
        let id = monster.id();
        self.monsters.insert(id, monster);
        id
    }

    // Test seams: scenario setup for unit and integration tests. The game
    // loop never calls these.

    /// Place a monster at a fixed spot
    #[doc(hidden)]
    pub fn spawn_monster_at(&mut self, position: Vector2) -> Uuid {
        let id = uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid();
        let monster = Monster::spawn_at(&mut self.world, id, position, self.elapsed_ms);
        self.monsters.insert(id, monster);
        id
    }

    /// Move a player's body directly, bypassing input and collision
    #[doc(hidden)]
    pub fn teleport_player(&mut self, player_id: Uuid, position: Vector2) -> bool {
        match self.players.get(&player_id) {
            Some(player) => self.world.set_position(player.body(), position),
            None => false,
        }
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn monster(&self, id: Uuid) -> Option<&Monster> {
        self.monsters.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn monster_count(&self) -> usize {
        self.monsters.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_state(&self, connection_id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&connection_id).map(|c| c.state)
    }

    /// Player currently driven by `connection_id`
    pub fn player_of(&self, connection_id: ConnectionId) -> Option<Uuid> {
        self.connections.get(&connection_id)?.player_id
    }

    pub fn pending_inputs(&self) -> usize {
        self.input_queue.len()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn player_snapshots(&self) -> PlayerSnapshots {
        self.players
            .iter()
            .map(|(id, player)| (*id, player.snapshot(&self.world)))
            .collect()
    }

    pub fn monster_snapshots(&self) -> MonsterSnapshots {
        self.monsters
            .iter()
            .map(|(id, monster)| (*id, monster.snapshot(&self.world)))
            .collect()
    }

    /// Register a connection and spawn its player.
    ///
    /// The new connection receives `INITIAL_GAME_STATE`; everyone else
    /// receives `PLAYER_JOINED`.
    pub fn connect(&mut self, connection_id: ConnectionId, name: String, outbound: Outbound) -> Option<Uuid> {
        if self.connections.contains_key(&connection_id) {
            warn!(connection_id = %connection_id, "Connection already registered");
            return None;
        }

        self.connections.insert(
            connection_id,
            Connection {
                state: ConnectionState::Connecting,
                name,
                player_id: None,
                outbound,
            },
        );

        let player_id = self.spawn_player(connection_id)?;
        info!(
            connection_id = %connection_id,
            player_id = %player_id,
            players = self.players.len(),
            "Player connected"
        );
        Some(player_id)
    }

    /// Buffer an input until the next physics tick
    pub fn enqueue_input(&mut self, connection_id: ConnectionId, input: PlayerInput) {
        match self.connections.get(&connection_id) {
            Some(conn) if conn.state == ConnectionState::Active => {
                self.input_queue.push_back(QueuedInput {
                    connection_id,
                    input,
                });
            }
            _ => {
                debug!(connection_id = %connection_id, "Input from unknown connection ignored");
            }
        }
    }

    /// Replace the connection's player with a fresh one
    pub fn restart(&mut self, connection_id: ConnectionId) -> Option<Uuid> {
        let conn = self.connections.get(&connection_id)?;
        if conn.state != ConnectionState::Active {
            return None;
        }

        if let Some(old_id) = conn.player_id {
            if let Some(snapshot) = self.remove_player(old_id) {
                self.broadcast(
                    ServerMsg::PlayerLeft {
                        player_id: old_id,
                        player: snapshot,
                    },
                    Some(connection_id),
                );
            }
        }

        let player_id = self.spawn_player(connection_id)?;
        info!(connection_id = %connection_id, player_id = %player_id, "Player restarted");
        Some(player_id)
    }

    /// Tear down a connection and its player
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        let Some(conn) = self.connections.get_mut(&connection_id) else {
            return;
        };
        // Terminated connections are skipped by every broadcast below
        conn.state = ConnectionState::Terminated;
        let player_id = conn.player_id;

        self.input_queue.retain(|queued| queued.connection_id != connection_id);

        match player_id.and_then(|id| self.remove_player(id).map(|snapshot| (id, snapshot))) {
            Some((player_id, snapshot)) => {
                info!(connection_id = %connection_id, player_id = %player_id, "Player disconnected");
                self.broadcast(
                    ServerMsg::PlayerLeft {
                        player_id,
                        player: snapshot,
                    },
                    None,
                );
            }
            None => {
                info!(connection_id = %connection_id, "Connection closed without a live player");
            }
        }

        self.connections.remove(&connection_id);
    }

    /// One fixed simulation step
    pub fn physics_tick(&mut self, delta_ms: f64) {
        for monster in self.monsters.values_mut() {
            monster.update(self.elapsed_ms, &mut self.rng, &mut self.world);
        }

        // The only place player velocity is zeroed
        for player in self.players.values() {
            self.world.set_velocity(player.body(), Vector2::ZERO);
        }

        let queued = std::mem::take(&mut self.input_queue);
        let processed = queued.len();
        for QueuedInput {
            connection_id,
            input,
        } in queued
        {
            self.apply_input(connection_id, &input);
        }

        self.world.step();
        self.elapsed_ms += delta_ms;
        self.tick += 1;

        if processed > 0 {
            trace!(tick = self.tick, inputs = processed, "Physics tick");
        }
    }

    /// Send `GAME_STATE` to everyone, then clear transient actions
    pub fn broadcast_tick(&mut self) {
        let msg = ServerMsg::GameState {
            players: self.player_snapshots(),
            monsters: self.monster_snapshots(),
        };
        self.broadcast(msg, None);

        for player in self.players.values_mut() {
            player.clear_pending_action();
        }
    }

    fn apply_input(&mut self, connection_id: ConnectionId, input: &PlayerInput) {
        let Some(player_id) = self.player_of(connection_id) else {
            debug!(connection_id = %connection_id, "Input for a player that no longer exists");
            return;
        };
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };

        match player.process_input(input, &mut self.world) {
            InputOutcome::Stale => {
                debug!(
                    player_id = %player_id,
                    sequence = input.sequence_number,
                    "Stale input dropped"
                );
            }
            InputOutcome::Applied { attack: Some(hitbox) } => {
                let attacker = player.body();
                self.resolve_attack(attacker, &hitbox);
            }
            InputOutcome::Applied { attack: None } => {}
        }
    }

    /// Damage every body under the swing exactly once
    fn resolve_attack(&mut self, attacker: BodyHandle, hitbox: &Rect) {
        for (_, owner) in self.world.overlapping_bodies(hitbox, Some(attacker)) {
            let outcome = match owner {
                BodyOwner::Player(id) => self.damage_player(id, PLAYER_ATTACK_DAMAGE),
                BodyOwner::Monster(id) => self.damage_monster(id, PLAYER_ATTACK_DAMAGE),
            };
            trace!(target_owner = ?owner, ?outcome, "Swing hit");
        }
    }

    pub fn damage_player(&mut self, player_id: Uuid, amount: i32) -> DamageOutcome {
        let Some(player) = self.players.get_mut(&player_id) else {
            return DamageOutcome::AlreadyDead;
        };

        let outcome = player.deal_damage(amount);
        if outcome == DamageOutcome::Killed {
            self.remove_player(player_id);
            info!(player_id = %player_id, "Player died");
            self.broadcast(ServerMsg::PlayerDied { player_id }, None);
        }
        outcome
    }

    pub fn damage_monster(&mut self, monster_id: Uuid, amount: i32) -> DamageOutcome {
        let Some(monster) = self.monsters.get_mut(&monster_id) else {
            return DamageOutcome::AlreadyDead;
        };

        let outcome = monster.deal_damage(amount);
        if outcome == DamageOutcome::Killed {
            if let Some(mut monster) = self.monsters.remove(&monster_id) {
                monster.destroy(&mut self.world);
            }
            info!(monster_id = %monster_id, remaining = self.monsters.len(), "Monster killed");
        }
        outcome
    }

    fn spawn_player(&mut self, connection_id: ConnectionId) -> Option<Uuid> {
        let name = self.connections.get(&connection_id)?.name.clone();
        let player = Player::spawn(&mut self.world, &mut self.rng, name);
        let player_id = player.id();
        let snapshot = player.snapshot(&self.world);
        self.players.insert(player_id, player);

        let initial = ServerMsg::InitialGameState {
            player_id,
            players: self.player_snapshots(),
            monsters: self.monster_snapshots(),
        };
        if let Some(conn) = self.connections.get_mut(&connection_id) {
            conn.player_id = Some(player_id);
            conn.state = ConnectionState::Active;
            conn.send(initial);
        }

        self.broadcast(
            ServerMsg::PlayerJoined {
                player_id,
                player: snapshot,
            },
            Some(connection_id),
        );
        Some(player_id)
    }

    /// Destroy a player and unlink it from its connection.
    /// Returns the final snapshot, or `None` if it was already gone.
    fn remove_player(&mut self, player_id: Uuid) -> Option<PlayerSnapshot> {
        let mut player = self.players.remove(&player_id)?;
        let snapshot = player.snapshot(&self.world);
        player.destroy(&mut self.world);

        for conn in self.connections.values_mut() {
            if conn.player_id == Some(player_id) {
                conn.player_id = None;
            }
        }
        Some(snapshot)
    }

    fn broadcast(&self, msg: ServerMsg, except: Option<ConnectionId>) {
        for (id, conn) in &self.connections {
            if Some(*id) == except || conn.state != ConnectionState::Active {
                continue;
            }
            conn.send(msg.clone());
        }
    }
}
