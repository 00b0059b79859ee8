//! Game loop task: physics clock, broadcast clock and connection events

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::error::GameError;
use crate::ws::protocol::PlayerInput;

use super::simulation::{ConnectionId, Outbound, Simulation};

/// Everything a connection session can ask of the game loop
#[derive(Debug)]
pub enum GameEvent {
    Connected {
        connection_id: ConnectionId,
        name: String,
        outbound: Outbound,
    },
    Input {
        connection_id: ConnectionId,
        input: PlayerInput,
    },
    Restart {
        connection_id: ConnectionId,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
}

/// Entity counts published after every tick, readable without the loop
#[derive(Debug, Default)]
pub struct GameStats {
    players: AtomicUsize,
    monsters: AtomicUsize,
}

/// Cloneable handle for talking to a running [`GameLoop`]
#[derive(Debug, Clone)]
pub struct GameHandle {
    events: mpsc::UnboundedSender<GameEvent>,
    stats: Arc<GameStats>,
}

impl GameHandle {
    /// Queue an event; returns false once the loop has stopped
    pub fn send(&self, event: GameEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn connect(&self, connection_id: ConnectionId, name: String, outbound: Outbound) -> bool {
        self.send(GameEvent::Connected {
            connection_id,
            name,
            outbound,
        })
    }

    pub fn input(&self, connection_id: ConnectionId, input: PlayerInput) -> bool {
        self.send(GameEvent::Input {
            connection_id,
            input,
        })
    }

    pub fn restart(&self, connection_id: ConnectionId) -> bool {
        self.send(GameEvent::Restart { connection_id })
    }

    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        self.send(GameEvent::Disconnected { connection_id })
    }

    pub fn player_count(&self) -> usize {
        self.stats.players.load(Ordering::Relaxed)
    }

    pub fn monster_count(&self) -> usize {
        self.stats.monsters.load(Ordering::Relaxed)
    }
}

/// Owns the [`Simulation`] and runs every callback on a single task, so the
/// entity maps need no locking.
pub struct GameLoop {
    sim: Simulation,
    events: mpsc::UnboundedReceiver<GameEvent>,
    stats: Arc<GameStats>,
    physics_period: Duration,
    broadcast_period: Duration,
}

impl GameLoop {
    pub fn new(sim: Simulation, physics_tps: u32, broadcast_tps: u32) -> (Self, GameHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(GameStats::default());

        let handle = GameHandle {
            events: events_tx,
            stats: stats.clone(),
        };

        let game_loop = Self {
            sim,
            events: events_rx,
            stats,
            physics_period: Duration::from_secs_f64(1.0 / physics_tps.max(1) as f64),
            broadcast_period: Duration::from_secs_f64(1.0 / broadcast_tps.max(1) as f64),
        };
        game_loop.publish_stats();

        (game_loop, handle)
    }

    pub fn from_config(config: &GameConfig) -> Result<(Self, GameHandle), GameError> {
        let sim = Simulation::from_config(config)?;
        Ok(Self::new(sim, config.physics_tps, config.broadcast_tps))
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Run until every [`GameHandle`] has been dropped
    pub async fn run(mut self) {
        info!(
            physics_ms = self.physics_period.as_secs_f64() * 1000.0,
            broadcast_ms = self.broadcast_period.as_secs_f64() * 1000.0,
            "Game loop started"
        );

        let delta_ms = self.physics_period.as_secs_f64() * 1000.0;

        let mut physics = interval(self.physics_period);
        physics.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Fixed delay between sends, not wall-clock corrected
        let mut broadcast = interval(self.broadcast_period);
        broadcast.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = physics.tick() => {
                    self.sim.physics_tick(delta_ms);
                    self.publish_stats();

                    if self.sim.tick() % 600 == 0 {
                        debug!(
                            tick = self.sim.tick(),
                            players = self.sim.player_count(),
                            monsters = self.sim.monster_count(),
                            connections = self.sim.connection_count(),
                            "Simulation stats"
                        );
                    }
                }
                _ = broadcast.tick() => {
                    self.sim.broadcast_tick();
                }
                event = self.events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event);
                        self.publish_stats();
                    }
                    None => {
                        info!("All game handles dropped, stopping game loop");
                        break;
                    }
                },
            }
        }
    }

    pub fn handle_event(&mut self, event: GameEvent) {
        match event {
            GameEvent::Connected {
                connection_id,
                name,
                outbound,
            } => {
                self.sim.connect(connection_id, name, outbound);
            }
            GameEvent::Input {
                connection_id,
                input,
            } => {
                self.sim.enqueue_input(connection_id, input);
            }
            GameEvent::Restart { connection_id } => {
                self.sim.restart(connection_id);
            }
            GameEvent::Disconnected { connection_id } => {
                self.sim.disconnect(connection_id);
            }
        }
    }

    fn publish_stats(&self) {
        self.stats
            .players
            .store(self.sim.player_count(), Ordering::Relaxed);
        self.stats
            .monsters
            .store(self.sim.monster_count(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::MapSize;
    use crate::game::math::{Key, KeySet};
    use crate::game::physics::PhysicsWorld;
    use crate::ws::protocol::ServerMsg;

    fn game_loop(monsters: usize) -> (GameLoop, GameHandle) {
        let sim = Simulation::new(PhysicsWorld::new(MapSize::new(800.0, 640.0)), 5, monsters);
        GameLoop::new(sim, 60, 22)
    }

    #[test]
    fn test_events_drive_simulation() {
        let (mut game, handle) = game_loop(2);
        assert_eq!(handle.monster_count(), 2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection_id = ConnectionId::new();
        game.handle_event(GameEvent::Connected {
            connection_id,
            name: "solo".to_string(),
            outbound: tx,
        });
        assert_eq!(game.simulation().player_count(), 1);
        assert!(matches!(rx.try_recv(), Ok(ServerMsg::InitialGameState { .. })));

        game.handle_event(GameEvent::Input {
            connection_id,
            input: PlayerInput {
                keys: KeySet::from([Key::Up]),
                time_delta: 16.0,
                sequence_number: 0,
            },
        });
        assert_eq!(game.simulation().pending_inputs(), 1);

        game.handle_event(GameEvent::Disconnected { connection_id });
        assert_eq!(game.simulation().player_count(), 0);
        assert_eq!(game.simulation().pending_inputs(), 0);
    }

    #[tokio::test]
    async fn test_loop_broadcasts_and_stops() {
        let (game, handle) = game_loop(1);
        let task = tokio::spawn(game.run());

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(handle.connect(ConnectionId::new(), "watcher".to_string(), tx));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ServerMsg::InitialGameState { .. }));

        let state = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(ServerMsg::GameState { players, monsters }) = rx.recv().await {
                    break (players.len(), monsters.len());
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(state, (1, 1));
        assert_eq!(handle.player_count(), 1);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
